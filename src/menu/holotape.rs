use argp::FromArgs;

use super::create_submodule;

create_submodule!(
    Holotape,
    "Manage holotape images (insert, append, list, extract, erase)",
    Insert(InsertOption),
    Append(AppendOption),
    List(ListOption),
    Extract(ExtractOption),
    Erase(EraseOption)
);

/// Formats a brand-new, blank tape image at `path`, or validates an existing one's geometry.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "insert")]
#[argp(description = "Create a blank tape image, or validate an existing one")]
pub struct InsertOption {
    #[argp(switch, long = "create")]
    #[argp(description = "format a brand-new, blank tape at this path instead of validating one")]
    pub create: bool,

    #[argp(positional)]
    #[argp(description = "tape image path")]
    pub tape: String,
}

/// Appends one or more host files onto a tape as new block chains.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "append")]
#[argp(description = "Append files onto a tape image")]
pub struct AppendOption {
    #[argp(positional)]
    #[argp(description = "tape image to modify")]
    pub tape: String,

    #[argp(positional)]
    #[argp(description = "files to append")]
    pub files: Vec<String>,
}

/// Lists every file stored on a tape.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "list")]
#[argp(description = "List the files stored on a tape image")]
pub struct ListOption {
    #[argp(positional)]
    #[argp(description = "tape image to inspect")]
    pub tape: String,
}

/// Extracts files off a tape into a host directory.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "extract")]
#[argp(description = "Extract files from a tape image into a directory")]
pub struct ExtractOption {
    #[argp(option, long = "name")]
    #[argp(description = "extract only this file (repeatable); default extracts everything")]
    pub name: Vec<String>,

    #[argp(positional)]
    #[argp(description = "tape image to read from")]
    pub tape: String,

    #[argp(positional)]
    #[argp(description = "directory to extract into")]
    pub outdir: String,
}

/// Zeroes every block on a tape, returning it to its empty state.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "erase")]
#[argp(description = "Erase a tape image back to its blank state")]
pub struct EraseOption {
    #[argp(positional)]
    #[argp(description = "tape image to erase")]
    pub tape: String,
}
