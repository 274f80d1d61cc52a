use argp::FromArgs;

/// Command to run an assembled executable on the emulator core, headless (no SDL bridge).
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "run")]
#[argp(description = "Run an assembled executable on the emulator core")]
pub struct RunOption {
    #[argp(option, long = "tape")]
    #[argp(description = "holotape image to insert before running (required to service holotape syscalls)")]
    pub tape: Option<String>,

    #[argp(option, long = "max-steps", default = "1_000_000")]
    #[argp(description = "instruction budget before the run is aborted as non-terminating")]
    pub max_steps: u64,

    #[argp(positional)]
    #[argp(description = "executable file to load directly into the instruction/data images")]
    pub input: String,
}
