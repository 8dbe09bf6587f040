mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::num::NonZeroU16;
use std::process;

use sentry_core::calibration::CalibrationSettings;
use sentry_core::config::ControllerConfig;
use sentry_core::motion::MotionThreshold;
use session::Session;

const USAGE: &str = "Usage: sentry-emulator [--threshold <m/s²>] [--samples <count>]";

fn main() -> io::Result<()> {
    let config = parse_config(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let (mut session, banner) = Session::new(config).unwrap_or_else(|err| {
        eprintln!("{err}");
        process::exit(1);
    });
    let mut line = String::new();

    writeln!(
        writer,
        "Motion Sentry Emulator ready. Type `help` for commands or `exit` to quit."
    )?;
    for message in banner {
        writeln!(writer, "{message}")?;
    }

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed) {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_config(args: impl IntoIterator<Item = String>) -> Result<ControllerConfig, String> {
    let mut config = ControllerConfig::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--threshold" => {
                let raw = value()?;
                let threshold = raw
                    .parse::<f32>()
                    .ok()
                    .and_then(|parsed| MotionThreshold::new(parsed).ok())
                    .ok_or_else(|| format!("`{raw}` is not a positive threshold"))?;
                config = config.with_threshold(threshold);
            }
            "--samples" => {
                let raw = value()?;
                let samples = raw
                    .parse::<NonZeroU16>()
                    .map_err(|_| format!("`{raw}` is not a sample count between 1 and 65535"))?;
                let spacing = config.calibration.spacing;
                config = config.with_calibration(CalibrationSettings::new(samples, spacing));
            }
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }

    Ok(config)
}
