use anyhow::{Context, Result, bail};
use clap::Parser;
use host::{HostServer, Outcome, SimConfig, Simulator};
use kernel::Logger;
use log::LevelFilter;
use types::auxv::key_name;

/// Boot a RISC-V program under the proxy kernel on a simulated hart and
/// report the state it would start in.
#[derive(Parser, Debug)]
#[command(name = "pk-run", version)]
struct Args {
    /// Main memory size in MiB
    #[arg(long, default_value_t = 64)]
    mem: u64,

    /// Number of harts that reach the boot path
    #[arg(long, default_value_t = 1)]
    harts: u32,

    /// Refuse the requested address translation mode
    #[arg(long)]
    no_vm: bool,

    /// Model a core without F/D and a soft-float kernel
    #[arg(long)]
    soft_float: bool,

    /// Print kernel debug logging to stderr
    #[arg(long)]
    trace: bool,

    /// Kernel command line: pk options, then the program and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pk_args: Vec<String>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn mem_bytes(mib: u64) -> Result<u64> {
    if mib == 0 {
        bail!("--mem must be at least 1 MiB");
    }
    match mib.checked_mul(1 << 20) {
        Some(bytes) => Ok(bytes),
        None => bail!("--mem {mib} MiB does not fit in the address space"),
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let mem_size = mem_bytes(args.mem)?;

    let mut argv = vec!["pk".to_string()];
    argv.extend(args.pk_args.iter().cloned());
    let server = HostServer::new(&argv).with_host_fs(true).with_echo(true);

    let mut config = SimConfig {
        mem_size,
        harts: args.harts,
        translation: !args.no_vm,
        ..SimConfig::default()
    };
    if args.soft_float {
        config = config.soft_float();
        report(Simulator::<false>::new(config, server), args.trace)
    } else {
        report(Simulator::<true>::new(config, server), args.trace)
    }
}

fn report<const HARD_FLOAT: bool>(sim: Simulator<HARD_FLOAT>, trace: bool) -> Result<()> {
    if trace {
        let logger = Box::leak(Box::new(Logger::new(sim.frontend())));
        kernel::console::init(logger, LevelFilter::Debug)
            .map_err(|e| anyhow::anyhow!("installing logger: {e}"))?;
    }

    let started = match sim.boot() {
        Outcome::Exited(code) => std::process::exit(code as i32),
        Outcome::Started(started) => started,
    };

    let image = started.image();
    let stack = started
        .stack()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("decoding the initial user stack")?;

    println!("program started");
    println!("  entry     {:#x}", image.entry);
    println!("  bias      {:#x}", image.bias);
    println!("  brk       {:#x}..{:#x}", image.brk_min, image.brk_max);
    println!("  stack top {:#x}", image.stack_top);
    println!("  sp        {:#x}", stack.sp);
    println!("  mode      {:?}", started.machine().privilege());
    println!("  vm        {}", started.context().have_vm);
    println!("argv ({}):", stack.argc);
    for (i, arg) in stack.argv.iter().enumerate() {
        println!("  [{i}] {arg}");
    }
    println!("auxv:");
    for entry in &stack.auxv {
        println!("  {:<10} {:#x}", key_name(entry.key), entry.value);
    }
    println!("frame: {:?}", started.frame);

    let host = sim.host();
    println!(
        "{} host calls, {} bytes to stdout",
        host.requests().len(),
        host.stdout().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sizes_are_checked() {
        assert_eq!(mem_bytes(64).unwrap(), 64 << 20);
        assert!(mem_bytes(0).is_err());
        assert!(mem_bytes(u64::MAX >> 10).is_err());
    }
}
