use argp::FromArgs;

/// Command to assemble a source file into an executable.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "assemble")]
#[argp(description = "Assemble a source file into an executable")]
pub struct AssembleOption {
    #[argp(option, short = 'I')]
    #[argp(description = "directory to search for \".include\"d files (repeatable)")]
    pub include: Vec<String>,

    #[argp(switch, long = "summary")]
    #[argp(description = "print a human-readable summary instead of writing the executable")]
    pub summary: bool,

    #[argp(positional)]
    #[argp(description = "source file to assemble")]
    pub input: String,

    #[argp(positional)]
    #[argp(description = "executable file to write")]
    pub output: Option<String>,
}
