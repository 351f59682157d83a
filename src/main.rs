use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::process;

use env_logger::Env;
use log::info;

use mcsim::commons::NUM_CORES;
use mcsim::files;
use mcsim::memory::MainMemory;
use mcsim::trace::Tracer;
use mcsim::Simulator;

// positional argument order; running with no arguments uses these names
const DEFAULT_FILES: [&str; 27] = [
    "imem0.txt", "imem1.txt", "imem2.txt", "imem3.txt",
    "memin.txt", "memout.txt",
    "regout0.txt", "regout1.txt", "regout2.txt", "regout3.txt",
    "core0trace.txt", "core1trace.txt", "core2trace.txt", "core3trace.txt",
    "bustrace.txt",
    "dsram0.txt", "dsram1.txt", "dsram2.txt", "dsram3.txt",
    "tsram0.txt", "tsram1.txt", "tsram2.txt", "tsram3.txt",
    "stats0.txt", "stats1.txt", "stats2.txt", "stats3.txt",
];

fn file_paths() -> Result<Vec<PathBuf>, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.len() {
        0 => Ok(DEFAULT_FILES.iter().map(PathBuf::from).collect()),
        27 => Ok(args.into_iter().map(PathBuf::from).collect()),
        n => Err(format!(
            "expected no arguments or all {} file names, got {}",
            DEFAULT_FILES.len(),
            n
        )),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let paths = file_paths()?;
    let (imem, rest) = paths.split_at(NUM_CORES);
    let memin = &rest[0];
    let memout = &rest[1];
    let regout = &rest[2..6];
    let core_trace = &rest[6..10];
    let bus_trace = &rest[10];
    let dsram = &rest[11..15];
    let tsram = &rest[15..19];
    let stats = &rest[19..23];

    let mut images: [Vec<u32>; NUM_CORES] = Default::default();
    for (image, path) in images.iter_mut().zip(imem) {
        *image = files::load_hex_image(path)?.unwrap_or_default();
    }
    let memory = MainMemory::from_image(files::load_hex_image(memin)?.unwrap_or_default());

    let mut sim = Simulator::new(images, memory);
    let mut tracer = Tracer::new(
        core_trace
            .iter()
            .map(|p| files::create_writer(p))
            .collect::<Result<Vec<_>, _>>()?,
        files::create_writer(bus_trace)?,
    );

    while !sim.done() {
        tracer.trace_cores(sim.cycle(), &sim.cores)?;
        sim.step();
        tracer.trace_bus(sim.cycle() - 1, &sim.bus)?;
    }
    tracer.flush()?;
    info!("finished after {} cycles", sim.cycle());

    files::save_hex_image(memout, sim.memory.data())?;
    for (i, core) in sim.cores.iter().enumerate() {
        files::save_registers(&regout[i], core)?;
        files::save_dsram(&dsram[i], &core.cache)?;
        files::save_tsram(&tsram[i], &core.cache)?;
        files::save_stats(&stats[i], core)?;
    }
    Ok(())
}

fn main() {
    env_logger::init_from_env(Env::default().filter_or("MCSIM_LOG", "warn"));
    if let Err(e) = run() {
        eprintln!("mcsim: {}", e);
        process::exit(1);
    }
}
