use argp::FromArgs;

mod assemble;
pub use assemble::AssembleOption;
mod emulate;
pub use emulate::RunOption;
pub mod holotape;
pub use holotape::{HolotapeModules, HolotapeOption};

/// Top-level command
#[derive(FromArgs, PartialEq, Debug)]
#[argp(description = "Assembler, emulator, and holotape toolchain for a fantasy 16-bit machine.")]
pub struct Robco {
    #[argp(option, short = 'v', global, default = "0")]
    #[argp(
        description = "Logging level (0 = Off, 1 = Error, 2 = Warn, 3 = Info, 4 = Debug, 5 = Trace)"
    )]
    pub verbose: usize,

    #[argp(subcommand)]
    pub nested: Modules,
}

/// These are all the top-level operations `robco` supports via command line.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
#[non_exhaustive]
pub enum Modules {
    Assemble(AssembleOption),
    Run(RunOption),
    Holotape(HolotapeOption),
}

// Some interaction with argp/argh's derives breaks doc comment macro expansion, so I can't use
// `#[doc = concat!("", stringify!($module_str), "")]`
macro_rules! create_submodule {
    ($module_name:ident, $module_description:expr, $( $submodule_name:ident($submodule_type:ty) ),* ) => {
        use paste::paste;
        paste! {
            // This is the command for the `$module_str` module.
            #[derive(FromArgs, PartialEq, Debug)]
            #[argp(subcommand, name = $module_name:lower)]
            #[argp(description = $module_description)]
            pub struct [<$module_name Option>] {
                #[argp(subcommand)]
                pub nested: [<$module_name Modules>],
            }

            // These are all supported operations within `$module_str`.
            #[derive(FromArgs, PartialEq, Debug)]
            #[argp(subcommand)]
            #[non_exhaustive]
            pub enum [<$module_name Modules>] {
                $( $submodule_name($submodule_type) ),*
            }
        }
    };
}
pub(crate) use create_submodule;
