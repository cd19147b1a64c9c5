use anyhow::Context;
use applied_motion_lib::{Drive, DriveConfig};

// Model 20 firmware 6 drive at the default baud rate unless told otherwise
fn parse_args() -> anyhow::Result<DriveConfig> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let number = |index: usize, default: u32| -> anyhow::Result<u32> {
        match args.get(index) {
            Some(value) => value
                .parse()
                .with_context(|| format!("argument {} is not a number: {}", index + 1, value)),
            None => Ok(default),
        }
    };

    Ok(DriveConfig::new(number(0, 20)?, number(1, 6)?).with_baud_rate(number(2, 9600)?))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = parse_args()?;
    let mut drive = Drive::connect(&config).context("no Applied Motion drive found")?;
    log::info!("Drive {} bound on {}", drive.revision(), drive.port_name());

    let protocol = drive.protocol_mut();
    println!("acceleration rate: {}", protocol.get_acc_rate()?);
    println!("alarm code : 0x{}", protocol.get_alarm_code()?);

    Ok(())
}
