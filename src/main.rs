//! vcqpu: disassemble and emulate QPU code files.

use std::env;
use std::fs::File;
use std::io::BufReader;

use anyhow::{bail, Context};
use vcqpu::backend::{self, v3d, vc4, Target};
use vcqpu::config::Config;
use vcqpu::emu::{Engine, EngineStatus, QpuStatus};
use vcqpu::heap::Heap;

const USAGE: &str = "usage: vcqpu <code.bin> [--target vc4|v3d] [--run] [--qpus N] [--uniform X]...
       vcqpu --sample-config";

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--sample-config") {
        print!("{}", Config::sample_config());
        return Ok(());
    }
    if args.iter().any(|a| a == "--help" || a == "-h") || args.len() < 2 {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::get();
    let mut target = config.target();
    let mut num_qpus = 1;
    let mut uniforms = Vec::new();
    let mut run = false;
    let mut path = None;

    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--run" => run = true,
            "--target" => {
                let value = iter.next().context("--target needs a value")?;
                target = value.parse().map_err(anyhow::Error::msg)?;
            }
            "--qpus" => {
                let value = iter.next().context("--qpus needs a value")?;
                num_qpus = value
                    .parse()
                    .with_context(|| format!("invalid QPU count '{}'", value))?;
            }
            "--uniform" => {
                let value = iter.next().context("--uniform needs a value")?;
                uniforms.push(parse_word(value)?);
            }
            other if !other.starts_with('-') => path = Some(other),
            other => bail!("unknown option '{}'\n{}", other, USAGE),
        }
    }

    let Some(path) = path else {
        bail!("no code file given\n{}", USAGE);
    };
    let file = File::open(path).with_context(|| format!("opening {}", path))?;
    let words = backend::read_words(BufReader::new(file))
        .with_context(|| format!("reading {}", path))?;
    println!("{}: {} words ({})", path, words.len(), target);
    println!();

    let listing = match target {
        Target::Vc4 => vc4::disassemble(&words)?,
        Target::V3d => v3d::disassemble(&words)?,
    };
    print!("{}", listing);

    if run {
        if target != Target::Vc4 {
            bail!("only VC4 code can be emulated from a code file");
        }
        emulate(config, &words, num_qpus, &uniforms)?;
    }
    Ok(())
}

/// Decimal or `0x` hex.
fn parse_word(s: &str) -> anyhow::Result<u32> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.with_context(|| format!("invalid uniform '{}'", s))
}

fn emulate(config: &Config, words: &[u64], num_qpus: usize, uniforms: &[u32]) -> anyhow::Result<()> {
    let mut engine = Engine::from_vc4(words, num_qpus, uniforms)?.with_max_steps(config.max_steps());
    let mut heap = Heap::new(config.heap_size())?;
    let rounds = engine.run(&mut heap)?;

    println!();
    println!("Emulation");
    println!("=========");
    println!("Rounds: {}", rounds);
    println!("Status: {:?}", engine.status);
    for (id, qpu) in engine.qpus.iter().enumerate() {
        let state = match qpu.status {
            QpuStatus::Halted => "halted".to_string(),
            QpuStatus::Blocked { id } => format!("blocked on semaphore {}", id),
            other => format!("{:?}", other).to_lowercase(),
        };
        println!(
            "  QPU {:2}: {} steps, {} stalls, {}",
            id, qpu.steps, qpu.stalls, state
        );
    }
    if engine.status != EngineStatus::AllHalted {
        bail!("emulation stopped before every core halted");
    }
    Ok(())
}
