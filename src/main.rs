use std::{
    env,
    fs::{read_to_string, File},
    io::{BufWriter, Error, ErrorKind, Result, Write},
};
use rayon::prelude::*;
use toml::{from_str, Value};
use channel_gating::channel::{GateName, TabulatedChannel, TickInfo};
use channel_gating::error::ChannelGatingError;


fn parse_bool(value: &Value, field_name: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as boolean", field_name)))
}

fn parse_usize(value: &Value, field_name: &str) -> Result<usize> {
    value
        .as_integer()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as unsigned integer", field_name)))
        .map(|v| v as usize)
}

fn parse_f64(value: &Value, field_name: &str) -> Result<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|v| v as f64))
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as float", field_name)))
}

fn parse_string(value: &Value, field_name: &str) -> Result<String> {
    value
        .as_str()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as string", field_name)))
        .map(String::from)
}

fn parse_f64_array(value: &Value, field_name: &str) -> Result<Vec<f64>> {
    value
        .as_array()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as array", field_name)))?
        .iter()
        .map(|entry| parse_f64(entry, field_name))
        .collect()
}

fn parse_value_with_default<T>(
    table: &Value,
    key: &str,
    parser: impl Fn(&Value, &str) -> Result<T>,
    default: T,
) -> Result<T> {
    table
        .get(key)
        .map_or(Ok(default), |value| parser(value, key))
}

fn core_error(err: impl Into<ChannelGatingError>) -> Error {
    Error::new(ErrorKind::InvalidData, format!("{}", err.into()))
}

// widen in the right order so the intermediate range stays valid
fn set_range(
    gate: &mut channel_gating::gate::TabulatedGate,
    caller: channel_gating::gate::ChannelId,
    min: f64,
    max: f64,
) -> Result<()> {
    if max > gate.min() {
        gate.set_max(caller, max).map_err(core_error)?;
        gate.set_min(caller, min).map_err(core_error)?;
    } else {
        gate.set_min(caller, min).map_err(core_error)?;
        gate.set_max(caller, max).map_err(core_error)?;
    }
    Ok(())
}

fn configure_gate(
    channel: &mut TabulatedChannel,
    name: GateName,
    table: &Value,
) -> Result<()> {
    let gate = channel
        .gate(name)
        .ok_or_else(|| Error::new(
            ErrorKind::InvalidData,
            format!("Gate {} configured but its power is 0", name.to_str()),
        ))?;
    let mut gate = gate.write();
    let caller = channel.id();

    let min = parse_value_with_default(table, "min", parse_f64, -0.1)?;
    let max = parse_value_with_default(table, "max", parse_f64, 0.05)?;
    let divs = parse_value_with_default(table, "divs", parse_usize, 3000)?;

    if let Some(parms) = table.get("alpha_parms") {
        let mut parms = parse_f64_array(parms, "alpha_parms")?;
        if parms.len() != 10 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "alpha_parms needs 10 coefficients, divs/min/max are separate fields",
            ));
        }
        parms.extend_from_slice(&[divs as f64, min, max]);
        gate.setup_alpha(caller, &parms).map_err(core_error)?;
    } else if let Some(parms) = table.get("tau_parms") {
        let mut parms = parse_f64_array(parms, "tau_parms")?;
        if parms.len() != 10 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "tau_parms needs 10 coefficients, divs/min/max are separate fields",
            ));
        }
        parms.extend_from_slice(&[divs as f64, min, max]);
        gate.setup_tau(caller, &parms).map_err(core_error)?;
    } else if table.get("alpha_expr").is_some() || table.get("tau_expr").is_some() {
        set_range(&mut gate, caller, min, max)?;
        gate.set_divs(caller, divs).map_err(core_error)?;
        if let Some(expr) = table.get("alpha_expr") {
            let alpha = parse_string(expr, "alpha_expr")?;
            let beta = parse_string(
                table.get("beta_expr").ok_or_else(|| Error::new(
                    ErrorKind::InvalidData, "alpha_expr requires beta_expr",
                ))?,
                "beta_expr",
            )?;
            gate.set_alpha_expr(caller, &alpha).map_err(core_error)?;
            gate.set_beta_expr(caller, &beta).map_err(core_error)?;
        } else if let Some(expr) = table.get("tau_expr") {
            let tau = parse_string(expr, "tau_expr")?;
            let inf = parse_string(
                table.get("inf_expr").ok_or_else(|| Error::new(
                    ErrorKind::InvalidData, "tau_expr requires inf_expr",
                ))?,
                "inf_expr",
            )?;
            gate.set_tau_expr(caller, &tau).map_err(core_error)?;
            gate.set_inf_expr(caller, &inf).map_err(core_error)?;
        }
        gate.fill_tables().map_err(core_error)?;
    } else if let Some(table_a) = table.get("table_a") {
        set_range(&mut gate, caller, min, max)?;
        let table_a = parse_f64_array(table_a, "table_a")?;
        let table_b = parse_f64_array(
            table.get("table_b").ok_or_else(|| Error::new(
                ErrorKind::InvalidData, "table_a requires table_b",
            ))?,
            "table_b",
        )?;
        gate.set_table_a(caller, table_a).map_err(core_error)?;
        gate.set_table_b(caller, table_b).map_err(core_error)?;
    } else {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!(
                "Gate {} needs alpha_parms, tau_parms, expressions, or tables",
                name.to_str(),
            ),
        ));
    }

    let use_interpolation =
        parse_value_with_default(table, "use_interpolation", parse_bool, true)?;
    gate.set_use_interpolation(caller, use_interpolation)
        .map_err(core_error)?;
    Ok(())
}

fn build_channel(config: &Value) -> Result<TabulatedChannel> {
    let channel_table = config
        .get("channel")
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Missing [channel] table"))?;

    let mut channel = TabulatedChannel::new();
    channel.set_gbar(parse_value_with_default(channel_table, "gbar", parse_f64, 0.0)?);
    channel.set_ek(parse_value_with_default(channel_table, "ek", parse_f64, 0.0)?);
    channel.set_instant(
        parse_value_with_default(channel_table, "instant", parse_usize, 0)? as u8,
    );

    let powers = [
        (GateName::X, "x_power", "x"),
        (GateName::Y, "y_power", "y"),
        (GateName::Z, "z_power", "z"),
    ];
    for (name, power_key, gate_key) in powers {
        let power = parse_value_with_default(channel_table, power_key, parse_usize, 0)?;
        if power == 0 {
            continue;
        }
        channel.set_power(name, power as u32).map_err(core_error)?;

        let gate_table = config
            .get("gates")
            .and_then(|gates| gates.get(gate_key))
            .ok_or_else(|| Error::new(
                ErrorKind::InvalidData,
                format!("{} > 0 but no [gates.{}] table", power_key, gate_key),
            ))?;
        configure_gate(&mut channel, name, gate_table)?;
    }

    Ok(channel)
}

struct ClampResult {
    hold: f64,
    gk: f64,
    ik: f64,
}

// run one voltage step to steady state on a freshly built channel
fn run_clamp(
    config: &Value,
    rest: f64,
    hold: f64,
    dt: f64,
    steps: usize,
) -> Result<ClampResult> {
    let mut channel = build_channel(config)?;
    let tick = TickInfo { time: 0.0, dt };

    channel.handle_vm(rest);
    channel.reinit(&tick).map_err(core_error)?;

    channel.handle_vm(hold);
    let mut output = channel.process(&tick).map_err(core_error)?;
    for _ in 1..steps {
        output = channel.process(&tick).map_err(core_error)?;
    }

    Ok(ClampResult {
        hold,
        gk: output.gk,
        ik: output.ik,
    })
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        println!("Requires .toml argument file");
        return Err(Error::new(ErrorKind::InvalidInput, "Requires .toml argument file"));
    }

    let toml_content = read_to_string(&args[1]).expect("Cannot read file");
    let config: Value = from_str(&toml_content).expect("Cannot read config");

    let clamp_table = config
        .get("clamp")
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Missing [clamp] table"))?;
    let holds = parse_f64_array(
        clamp_table.get("holds").ok_or_else(|| Error::new(
            ErrorKind::InvalidData, "Missing clamp holds",
        ))?,
        "holds",
    )?;
    let rest = parse_value_with_default(clamp_table, "rest", parse_f64, 0.0)?;
    let dt = parse_value_with_default(clamp_table, "dt", parse_f64, 0.01)?;
    let steps = parse_value_with_default(clamp_table, "steps", parse_usize, 10_000)?;
    let output_file =
        parse_value_with_default(clamp_table, "output", parse_string, String::from("clamp.csv"))?;

    // each hold level runs on its own channel, the levels are independent
    let results: Vec<Result<ClampResult>> = holds
        .par_iter()
        .map(|&hold| run_clamp(&config, rest, hold, dt, steps))
        .collect();

    let mut file = BufWriter::new(File::create(&output_file)
        .expect("Unable to create file"));
    writeln!(file, "vm,gk,ik").expect("Unable to write to file");
    for result in results {
        let result = result?;
        writeln!(file, "{},{},{}", result.hold, result.gk, result.ik)
            .expect("Unable to write to file");
    }

    println!("Wrote {} clamp levels to {}", holds.len(), output_file);
    Ok(())
}
