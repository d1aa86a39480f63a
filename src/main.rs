use anyhow::{bail, Context};
use autolevel::{
    contour_gcode_text, init_logging_with, list_ports, CalibrationEvent, CalibrationParams,
    CommandParams, Config, HeightMap, LogFormat, LogicalCommand, MachineSession, UnmatchedLines,
    BUILD_DATE, VERSION,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "autolevel", version, about = "Probe a CNC work surface and contour G-code to follow it")]
struct Cli {
    /// Config file (.toml or .json); defaults to the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports that look like a CNC or switch
    Ports,
    /// Send one logical command to the CNC and print the response
    Send(SendArgs),
    /// Probe a grid and write the height map
    Probe(ProbeArgs),
    /// Contour a G-code program against a height map
    Contour(ContourArgs),
}

#[derive(Args, Debug)]
struct CncPortArgs {
    /// CNC serial port
    #[arg(long)]
    port: Option<String>,
    /// CNC baud rate
    #[arg(long)]
    baud: Option<u32>,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Command name, e.g. HOME or MOVE_ABS
    command: String,
    #[command(flatten)]
    cnc: CncPortArgs,
    #[arg(long, allow_hyphen_values = true)]
    x: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    y: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    z: Option<f64>,
    #[arg(long)]
    f: Option<f64>,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    #[command(flatten)]
    cnc: CncPortArgs,
    /// Touch-off switch serial port
    #[arg(long)]
    switch_port: Option<String>,
    /// Switch baud rate
    #[arg(long)]
    switch_baud: Option<u32>,
    /// Grid width (mm)
    #[arg(long)]
    x: Option<f64>,
    /// Grid height (mm)
    #[arg(long)]
    y: Option<f64>,
    /// Points per row
    #[arg(long)]
    xn: Option<u32>,
    /// Number of rows
    #[arg(long)]
    yn: Option<u32>,
    /// Step-down per probe step (mm)
    #[arg(long)]
    zstep: Option<f64>,
    /// Travel height between points (mm)
    #[arg(long)]
    ztrav: Option<f64>,
    /// Probes averaged per point
    #[arg(long)]
    samples: Option<u32>,
    /// Height map output file
    #[arg(short, long, default_value = "heightmap.json")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ContourArgs {
    /// G-code program to contour
    input: PathBuf,
    /// Height map JSON file
    #[arg(long)]
    height_map: PathBuf,
    /// Output file; defaults to the input with a .cgcode extension
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Cutting depth below the surface (mm)
    #[arg(long, allow_hyphen_values = true)]
    depth: Option<f64>,
    /// Copy lines that are not rewritten to the output
    #[arg(long)]
    pass_through: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging_with(format)?;
    tracing::debug!("autolevel {} built {}", VERSION, BUILD_DATE);

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Command::Ports => ports(),
        Command::Send(args) => send(&config, args).await,
        Command::Probe(args) => probe(&config, args).await,
        Command::Contour(args) => contour(&config, args),
    }
}

fn ports() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

async fn open_cnc(
    session: &mut MachineSession,
    config: &Config,
    args: &CncPortArgs,
) -> anyhow::Result<()> {
    let Some(port) = args.port.clone().or_else(|| config.connection.cnc_port.clone()) else {
        bail!("no CNC port given; pass --port or set connection.cnc_port");
    };
    let baud = args.baud.unwrap_or(config.connection.cnc_baud);
    session
        .open_cnc_port(&port, baud)
        .await
        .with_context(|| format!("opening CNC port {}", port))?;
    Ok(())
}

async fn send(config: &Config, args: SendArgs) -> anyhow::Result<()> {
    let command: LogicalCommand = args.command.parse()?;
    let params = CommandParams {
        x: args.x,
        y: args.y,
        z: args.z,
        f: args.f,
        s: None,
    };

    let mut session = MachineSession::from_config(config);
    open_cnc(&mut session, config, &args.cnc).await?;

    let params = (!params.is_empty()).then_some(params);
    let response = session.send_command(command, params).await?;
    println!("{}", response);

    session.close().await;
    Ok(())
}

async fn probe(config: &Config, args: ProbeArgs) -> anyhow::Result<()> {
    let defaults = &config.probing;
    let params = CalibrationParams::new(
        args.x.unwrap_or(defaults.x),
        args.y.unwrap_or(defaults.y),
        args.xn.unwrap_or(defaults.xn),
        args.yn.unwrap_or(defaults.yn),
        args.zstep.unwrap_or(defaults.zstep),
        args.ztrav.unwrap_or(defaults.ztrav),
    )
    .with_samples(args.samples.unwrap_or(defaults.samples));

    let Some(switch_port) = args
        .switch_port
        .clone()
        .or_else(|| config.connection.switch_port.clone())
    else {
        bail!("no switch port given; pass --switch-port or set connection.switch_port");
    };
    let switch_baud = args.switch_baud.unwrap_or(config.connection.switch_baud);

    let mut session = MachineSession::from_config(config);
    open_cnc(&mut session, config, &args.cnc).await?;
    session
        .open_switch_port(&switch_port, switch_baud)
        .await
        .with_context(|| format!("opening switch port {}", switch_port))?;

    let mut events = session.start_calibration(params)?;
    let total = params.point_count();
    let mut probed = 0usize;

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(CalibrationEvent::Point(point)) => {
                    probed += 1;
                    println!("[{}/{}] X:{:.3} Y:{:.3} Z:{:.4}", probed, total, point.x, point.y, point.z);
                }
                Some(CalibrationEvent::Done(map)) => break Ok(map),
                Some(CalibrationEvent::Error(e)) => break Err(e),
                None => bail!("calibration ended without a result"),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping...");
                if let Err(e) = session.stop_calibration() {
                    tracing::warn!("Stop request ignored: {}", e);
                }
            }
        }
    };

    session.close().await;

    let map = outcome.context("calibration did not complete")?;
    map.save_to_file(&args.output)?;
    println!("Wrote {} points to {}", map.len(), args.output.display());
    Ok(())
}

fn contour(config: &Config, args: ContourArgs) -> anyhow::Result<()> {
    let program = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let map = HeightMap::load_from_file(&args.height_map)
        .with_context(|| format!("reading height map {}", args.height_map.display()))?;

    let mut options = config.contour.options();
    if let Some(depth) = args.depth {
        options.target_z_depth = depth;
    }
    if args.pass_through {
        options.unmatched = UnmatchedLines::PassThrough;
    }

    let text = contour_gcode_text(&program, &map, &options)?;
    let output = args.output.unwrap_or_else(|| default_output(&args.input));
    std::fs::write(&output, text + "\n")
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    input.with_extension("cgcode")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_output() {
        assert_eq!(default_output(Path::new("board.gcode")), PathBuf::from("board.cgcode"));
        assert_eq!(default_output(Path::new("dir/part")), PathBuf::from("dir/part.cgcode"));
    }

    #[test]
    fn test_send_args_parse() {
        let cli = Cli::try_parse_from(["autolevel", "send", "MOVE_REL", "--z", "-0.5"]).unwrap();
        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.command, "MOVE_REL");
                assert_eq!(args.z, Some(-0.5));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
