//! Bench front end for the OIS engine.
//!
//! Runs one command against a simulated OIS module and prints the result followed by the
//! last-operation status, the way factory tooling reads it back.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_ois::config::OisConfig;
use rust_ois::data::FileReportSink;
use rust_ois::engine::firmware::FirmwareImage;
use rust_ois::hardware::mock::SimulatedRig;
use rust_ois::hardware::EEPROM_GYRO_CAL_FLAG;
use rust_ois::{CommandOutput, OisCommand};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "OIS control and calibration bench")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config/ois.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Take a power reference before running the command
    #[arg(short, long)]
    powered: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Switch {
    #[value(alias = "up")]
    On,
    #[value(alias = "down")]
    Off,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a register
    Read {
        #[arg(value_parser = parse_hex_u16)]
        addr: u16,
        /// Width in bytes (1, 2 or 4)
        #[arg(default_value_t = 1)]
        width: u8,
    },
    /// Write a register
    Write {
        #[arg(value_parser = parse_hex_u16)]
        addr: u16,
        #[arg(value_parser = parse_hex_u32)]
        value: u32,
        /// Width in bytes (1, 2 or 4)
        #[arg(default_value_t = 1)]
        width: u8,
    },
    /// Select the bus address used for register access
    Slave {
        #[arg(value_parser = parse_hex_u8)]
        id: u8,
    },
    /// Take (on/up) or drop (off/down) a power reference
    Power {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Switch servo mode (0 servo off, 1 preview, 2 capture, 3 test)
    Mode { code: u8 },
    /// Servo on or off
    Servo {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Servo state reported by the device
    State,
    /// Chip state text
    StateText,
    /// Gyro offset calibration
    Calibrate,
    /// Snapshot a register window and verify it straight away
    Backup {
        #[arg(value_parser = parse_hex_u16)]
        base: Option<u16>,
        length: Option<usize>,
    },
    /// Flash a firmware image
    UpdateFirmware { image: PathBuf },
    /// Sample a telemetry batch (1024 or 2048)
    Telemetry {
        #[arg(default_value_t = 1024)]
        count: usize,
    },
    /// Print the last stored telemetry batch
    TelemetryReport,
    /// Hall sensor calibration
    HallCalibration,
    /// Reset every parameter to its initial value
    ResetParameters,
    /// Commit OIS data to flash
    SyncToRom,
    /// Dump registers 0x0000..=0x02BC
    Dump,
    /// Save the parameter window to file
    SaveOisData,
    /// Restore the parameter window from file
    RestoreOisData,
    /// Gyro diagnostic words
    Gyro,
    /// Last-operation status
    Status,
    /// Driver attach status
    Probe,
    /// Show or set the device-identifying string
    DeviceName { name: Option<String> },
    /// Read or write an image sensor register
    Sensor {
        camera: u8,
        #[arg(value_parser = parse_hex_u16)]
        addr: u16,
        #[arg(default_value_t = 2)]
        width: u8,
        #[arg(long, value_parser = parse_hex_u32)]
        value: Option<u32>,
    },
    /// Read a calibration EEPROM byte
    Eeprom {
        #[arg(value_parser = parse_hex_u16)]
        addr: Option<u16>,
    },
    /// Print the effective configuration
    ShowConfig,
}

fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value '{}': {}", s, e))
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let value = parse_hex_u32(s)?;
    u16::try_from(value).map_err(|_| format!("'{}' does not fit 16 bits", s))
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("'{}' does not fit 8 bits", s))
}

fn to_commands(command: Command, config: &OisConfig) -> Vec<OisCommand> {
    match command {
        Command::Read { addr, width } => vec![OisCommand::ReadRegister { addr, width }],
        Command::Write { addr, value, width } => {
            vec![OisCommand::WriteRegister { addr, width, value }]
        }
        Command::Slave { id } => vec![OisCommand::SelectSlave(id)],
        Command::Power { state: Switch::On } => vec![OisCommand::PowerUp],
        Command::Power { state: Switch::Off } => vec![OisCommand::PowerDown],
        Command::Mode { code } => vec![OisCommand::SetMode(code)],
        Command::Servo { state: Switch::On } => vec![OisCommand::ServoOn],
        Command::Servo { state: Switch::Off } => vec![OisCommand::ServoOff],
        Command::State => vec![OisCommand::GetState],
        Command::StateText => vec![OisCommand::GetStateText],
        Command::Calibrate => vec![OisCommand::RunCalibration],
        Command::Backup { base, length } => vec![OisCommand::Backup {
            base: base.unwrap_or(config.device.backup_base),
            length: length.unwrap_or(config.device.backup_length),
        }],
        Command::UpdateFirmware { image } => {
            vec![OisCommand::UpdateFirmware(FirmwareImage::new(image))]
        }
        Command::Telemetry { count } => vec![OisCommand::SampleTelemetry(count)],
        Command::TelemetryReport => vec![OisCommand::ReadTelemetryReport],
        Command::HallCalibration => vec![OisCommand::HallCalibration],
        Command::ResetParameters => vec![OisCommand::ResetParameters],
        Command::SyncToRom => vec![OisCommand::SyncToRom],
        Command::Dump => vec![OisCommand::DumpRegisters],
        Command::SaveOisData => vec![OisCommand::SaveOisData],
        Command::RestoreOisData => vec![OisCommand::RestoreOisData],
        Command::Gyro => vec![OisCommand::GyroReport],
        Command::Status => vec![OisCommand::GetLastStatus],
        Command::Probe => vec![OisCommand::ProbeStatus],
        Command::DeviceName { name: Some(name) } => {
            vec![OisCommand::SetDeviceName(name), OisCommand::GetDeviceName]
        }
        Command::DeviceName { name: None } => vec![OisCommand::GetDeviceName],
        Command::Sensor {
            camera,
            addr,
            width,
            value: Some(value),
        } => vec![
            OisCommand::WriteSensorRegister {
                camera,
                addr,
                width,
                value,
            },
            OisCommand::ReadSensorRegister {
                camera,
                addr,
                width,
            },
        ],
        Command::Sensor {
            camera,
            addr,
            width,
            value: None,
        } => vec![OisCommand::ReadSensorRegister {
            camera,
            addr,
            width,
        }],
        Command::Eeprom { addr } => {
            vec![OisCommand::ReadEeprom(addr.unwrap_or(EEPROM_GYRO_CAL_FLAG))]
        }
        Command::ShowConfig => Vec::new(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = OisConfig::load_from(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.application.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    if matches!(args.command, Command::ShowConfig) {
        print!("{}", config.to_toml().context("Failed to render configuration")?);
        return Ok(());
    }

    info!(name = %config.application.name, device = %config.device.name, "Starting OIS bench");

    let rig = SimulatedRig::new();
    for camera in 0..3 {
        rig.sensors.set_powered(camera, true);
    }
    let device = rig.build_device_with(
        Box::new(FileReportSink::new(&config.reports)),
        &config.device,
    );

    if args.powered {
        device
            .execute(OisCommand::PowerUp)
            .context("Failed to power up the OIS device")?;
    }

    let mut outputs = Vec::new();
    for command in to_commands(args.command, &config) {
        if matches!(command, OisCommand::GetLastStatus) {
            outputs.push(device.execute(command)?);
            continue;
        }
        let output = device
            .execute(command.clone())
            .with_context(|| format!("{:?} failed", command))?;
        if let CommandOutput::Snapshot(snapshot) = &output {
            let changed = device.execute(OisCommand::Verify(snapshot.clone()))?;
            outputs.push(output);
            outputs.push(changed);
            continue;
        }
        outputs.push(output);
    }

    for output in &outputs {
        println!("{}", output);
    }
    println!("status: {}", device.get_last_status().code());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parsers() {
        assert_eq!(parse_hex_u16("0x8455").unwrap(), 0x8455);
        assert_eq!(parse_hex_u16("8455").unwrap(), 0x8455);
        assert!(parse_hex_u16("0x1_0000").is_err());
        assert!(parse_hex_u8("0x100").is_err());
        assert_eq!(parse_hex_u32("DEADBEEF").unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args =
            Args::try_parse_from(["rust_ois", "--powered", "read", "0x8455", "2"]).unwrap();
        assert!(args.powered);
        assert!(matches!(
            args.command,
            Command::Read {
                addr: 0x8455,
                width: 2
            }
        ));

        let args = Args::try_parse_from(["rust_ois", "power", "on"]).unwrap();
        assert!(matches!(args.command, Command::Power { state: Switch::On }));
        let args = Args::try_parse_from(["rust_ois", "servo", "off"]).unwrap();
        assert!(matches!(args.command, Command::Servo { state: Switch::Off }));
    }

    #[test]
    fn test_power_accepts_up_and_down() {
        let args = Args::try_parse_from(["rust_ois", "power", "up"]).unwrap();
        assert!(matches!(args.command, Command::Power { state: Switch::On }));
        let args = Args::try_parse_from(["rust_ois", "power", "down"]).unwrap();
        assert!(matches!(args.command, Command::Power { state: Switch::Off }));
        assert!(Args::try_parse_from(["rust_ois", "power", "sideways"]).is_err());
    }
}
