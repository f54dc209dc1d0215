//! Entrypoint for the command line host.
use std::{env, error::Error, fs, time::Instant};

use log::{debug, info};
use vip8::{
    constants::{DISPLAY_BUFFER_SIZE, DISPLAY_HEIGHT, DISPLAY_WIDTH},
    prelude::*,
    IMPL_VERSION,
};

static USAGE: &str = r#"
usage: vip8 CMD FILE

commands:
    run     Run the target ROM file
    dis     Disassemble the target ROM into readable assembly

examples:
    vip8 run breakout.rom
    vip8 dis breakout.rom
"#;

/// Renders the monochrome framebuffer as ASCII rows on stdout.
struct AsciiDisplay;

impl DisplaySink for AsciiDisplay {
    fn blit(&mut self, framebuffer: &[bool; DISPLAY_BUFFER_SIZE]) {
        let mut buf = String::with_capacity((DISPLAY_WIDTH + 1) * DISPLAY_HEIGHT);
        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                buf.push(if framebuffer[x + y * DISPLAY_WIDTH] {
                    '#'
                } else {
                    '.'
                });
            }
            buf.push('\n');
        }
        print!("{buf}");
    }
}

fn run_program(filepath: &str) -> Result<(), Box<dyn Error>> {
    let image = fs::read(filepath)?;

    let mut vm = Vip8Vm::new(Vip8Conf::default());
    vm.load_program(&image)?;

    if log::log_enabled!(log::Level::Debug) {
        debug!("program memory:\n{}", vm.dump_ram(image.len())?);
    }

    let start = Instant::now();
    let result = vm.execute();
    info!(
        "executed for {:.3}ms",
        start.elapsed().as_nanos() as f64 / 1_000_000.0
    );

    // Render whatever the program left on screen, even when it faulted.
    if vm.display_dirty() {
        AsciiDisplay.blit(vm.framebuffer());
        vm.clear_display_dirty();
    }

    result?;

    Ok(())
}

fn run_disassembler(filepath: &str) -> Result<(), Box<dyn Error>> {
    let image = fs::read(filepath)?;
    Disassembler::new(&image).print()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new().env().init()?;

    match parse_args() {
        Some(Cmd::Run { filepath }) => run_program(&filepath)?,
        Some(Cmd::Dis { filepath }) => run_disassembler(&filepath)?,
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    let cmd = args.next()?;
    match cmd.as_str() {
        "run" => Some(Cmd::Run {
            filepath: args.next()?,
        }),
        "dis" => Some(Cmd::Dis {
            filepath: args.next()?,
        }),
        _ => None,
    }
}

fn print_usage() {
    println!("vip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Run a ROM file.
    Run { filepath: String },
    /// Disassemble a ROM file.
    Dis { filepath: String },
}
