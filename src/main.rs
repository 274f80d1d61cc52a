#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::io::prelude::*;
use std::path::Path;

use anyhow::{Context, Result, bail};
use env_logger::Builder;
use log::{Level, LevelFilter};
use owo_colors::OwoColorize;
use robco_emu::{Machine, State, loader};
use robco_exe::ExecutableFile;
use robco_holotape::Deck;

mod menu;
use menu::{HolotapeModules, Modules};

fn color_level(level: Level) -> String {
    match level {
        Level::Error => level.red().to_string(),
        Level::Warn => level.yellow().to_string(),
        Level::Info => level.green().to_string(),
        Level::Debug => level.blue().to_string(),
        Level::Trace => level.purple().to_string(),
    }
}

const fn level_filter(verbose: usize) -> LevelFilter {
    match verbose {
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        5 => LevelFilter::Trace,
        //default to off
        _ => LevelFilter::Off,
    }
}

fn main() -> Result<()> {
    //Parse command line input
    let args: menu::Robco = argp::parse_args_or_exit(argp::DEFAULT);

    // Build up a logger with custom formatting and set it to the verbosity from the command line args
    if args.verbose != 0 {
        Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] {} {}",
                    robco_core::time::current_time(),
                    color_level(record.level()),                // Colored log level
                    record.args()                                // Log message
                )
            })
            .filter(None, level_filter(args.verbose))
            .init();
    }

    match args.nested {
        Modules::Assemble(params) => assemble(&params)?,
        Modules::Run(params) => run(&params)?,
        Modules::Holotape(module) => match module.nested {
            HolotapeModules::Insert(params) => holotape_insert(&params)?,
            HolotapeModules::Append(params) => holotape_append(&params)?,
            HolotapeModules::List(params) => holotape_list(&params)?,
            HolotapeModules::Extract(params) => holotape_extract(&params)?,
            HolotapeModules::Erase(params) => holotape_erase(&params)?,
        },
    }
    Ok(())
}

fn assemble(params: &menu::AssembleOption) -> Result<()> {
    let include_paths = params.include.iter().map(std::path::PathBuf::from).collect();
    let mut assembler = robco_asm::Assembler::new(include_paths);
    assembler.assemble_file(Path::new(&params.input));

    let file = match assembler.finalize() {
        Ok(file) => file,
        Err(errors) => {
            for error in &errors {
                eprintln!("error: {error}");
            }
            bail!("{} error(s) while assembling {}", errors.len(), params.input);
        }
    };

    if params.summary {
        print!("{}", robco_asm::summary::render(&file, assembler.symbols()));
        return Ok(());
    }

    let output = params.output.clone().unwrap_or_else(|| {
        let mut path = std::path::PathBuf::from(&params.input);
        path.set_extension("rex");
        path.to_string_lossy().into_owned()
    });
    let bytes = file.encode().context("encoding assembled executable")?;
    std::fs::write(&output, bytes).with_context(|| format!("writing {output}"))?;
    log::info!("assembled {} into {output}", params.input);
    Ok(())
}

fn run(params: &menu::RunOption) -> Result<()> {
    let mut machine = Machine::new();
    if let Some(tape) = &params.tape {
        machine.deck.insert(tape).with_context(|| format!("inserting tape {tape}"))?;
    }

    let bytes = std::fs::read(&params.input).with_context(|| format!("reading {}", params.input))?;
    let file = ExecutableFile::decode(&bytes).context("decoding executable")?;
    loader::relocate(&mut machine.memory, &file)?;
    machine.cpu.pc = file.execution_start_address;
    machine.cpu.state = State::Running;

    let mut steps = 0u64;
    while machine.state() == State::Running {
        if steps >= params.max_steps {
            bail!("exceeded --max-steps ({}) without terminating", params.max_steps);
        }
        machine.step()?;
        steps += 1;
    }

    match machine.state() {
        State::Finished => log::info!("program exited after {steps} instruction(s)"),
        State::Waiting => {
            log::warn!("program is waiting on keyboard input with no input bridge attached; stopping after {steps} instruction(s)");
        }
        other => bail!("emulation ended in unexpected state {other:?} after {steps} instruction(s)"),
    }
    Ok(())
}

fn holotape_insert(params: &menu::holotape::InsertOption) -> Result<()> {
    if params.create {
        let mut deck = Deck::new_blank();
        deck.flush(&params.tape).with_context(|| format!("writing tape {}", params.tape))?;
        log::info!("formatted a blank tape at {}", params.tape);
    } else {
        let mut deck = Deck::new();
        deck.insert(&params.tape).with_context(|| format!("inserting tape {}", params.tape))?;
        log::info!("{} is a valid tape image", params.tape);
    }
    Ok(())
}

fn holotape_append(params: &menu::holotape::AppendOption) -> Result<()> {
    let mut deck = Deck::new();
    deck.insert(&params.tape).with_context(|| format!("inserting tape {}", params.tape))?;
    for file in &params.files {
        deck.append(file).with_context(|| format!("appending {file}"))?;
        log::info!("appended {file}");
    }
    deck.flush(&params.tape).with_context(|| format!("writing tape {}", params.tape))?;
    Ok(())
}

fn holotape_list(params: &menu::holotape::ListOption) -> Result<()> {
    let mut deck = Deck::new();
    deck.insert(&params.tape).with_context(|| format!("inserting tape {}", params.tape))?;
    for name in deck.list()? {
        println!("{name}");
    }
    Ok(())
}

fn holotape_extract(params: &menu::holotape::ExtractOption) -> Result<()> {
    let mut deck = Deck::new();
    deck.insert(&params.tape).with_context(|| format!("inserting tape {}", params.tape))?;
    let names = if params.name.is_empty() { deck.list()? } else { params.name.clone() };

    let outdir = Path::new(&params.outdir);
    for name in names {
        deck.find(&name).with_context(|| format!("locating {name} on tape"))?;
        let mut bytes = Vec::new();
        loop {
            let header = deck.read().with_context(|| format!("reading {name}"))?;
            bytes.extend_from_slice(&deck.buffer[..usize::from(header.block_bytes)]);
            if header.remaining_blocks == 0 {
                break;
            }
        }
        let dest = outdir.join(&name);
        std::fs::write(&dest, &bytes).with_context(|| format!("writing {}", dest.display()))?;
        log::info!("extracted {name} ({} bytes)", bytes.len());
    }
    Ok(())
}

fn holotape_erase(params: &menu::holotape::EraseOption) -> Result<()> {
    let mut deck = Deck::new();
    deck.insert(&params.tape).with_context(|| format!("inserting tape {}", params.tape))?;
    deck.erase()?;
    deck.flush(&params.tape).with_context(|| format!("writing tape {}", params.tape))?;
    log::info!("erased {}", params.tape);
    Ok(())
}
