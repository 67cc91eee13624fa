//! Entrypoint for CLI
use std::{env, error::Error, fs, io::Write, process};

use log::{error, info};
use ocho::{constants::*, prelude::*, DisplayBuffer, Hz, IMPL_VERSION};

static USAGE: &str = r#"
usage: ocho CMD [ARGS]

commands:
    run FILE [SPEED]    Run the target ROM file, executing SPEED
                        instructions per display tick (default 10)

examples:
    ocho run breakout.rom
    ocho run breakout.rom 20
"#;

/// Paints the display buffer onto the terminal and swallows the buzzer
/// signal; a bare terminal has no tone generator.
struct TermDevices {
    frame: String,
}

impl TermDevices {
    fn new() -> Self {
        // Clear the terminal once; every frame afterwards re-homes the
        // cursor instead, which avoids flicker.
        print!("\x1B[2J");
        TermDevices {
            frame: String::new(),
        }
    }
}

impl Devices for TermDevices {
    fn draw(&mut self, display: DisplayBuffer<'_>) {
        self.frame.clear();
        self.frame.push_str("\x1B[H");

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if display[x + y * DISPLAY_WIDTH] {
                    self.frame.push('█');
                } else {
                    self.frame.push(' ');
                }
            }
            self.frame.push('\n');
        }

        print!("{}", self.frame);
        let _ = std::io::stdout().flush();
    }

    fn buzz(&mut self, _tone: Option<Hz>) {}
}

fn run_rom(filepath: &str, speed: Option<usize>) -> Result<(), Box<dyn Error>> {
    let rom = fs::read(filepath)?;

    let mut vm = OchoVm::new(OchoConf {
        steps_per_tick: speed,
    });
    vm.load_rom(&rom)?;
    info!("loaded {filepath} ({} bytes)", rom.len());

    let mut devices = TermDevices::new();
    let mut clock = Clock::new(Hz(TICK_FREQUENCY).into());

    loop {
        clock.wait();

        if let Flow::Interrupt = vm.cycle(&mut devices)? {
            break;
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new().env().init().unwrap();

    match parse_args() {
        Some(Cmd::Run { filepath, speed }) => {
            if let Err(err) = run_rom(&filepath, speed) {
                error!("{err}");
                process::exit(1);
            }
        }
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            process::exit(64)
        }
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    match args.next()?.as_str() {
        "run" => {
            let filepath = args.next()?;
            let speed = match args.next() {
                Some(arg) => Some(arg.parse().ok()?),
                None => None,
            };
            Some(Cmd::Run { filepath, speed })
        }
        _ => None,
    }
}

fn print_usage() {
    println!("ocho v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Run file
    Run {
        filepath: String,
        speed: Option<usize>,
    },
}
