//! SINVM CLI: run a flat .sml binary.

use clap::Parser as ClapParser;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process;

use sin_core::FlatBinary;
use sin_vm::Vm;

#[derive(ClapParser)]
#[command(name = "sinvm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SINVM - execute .sml binaries", long_about = None)]
struct Cli {
    /// The .sml binary to run
    input: PathBuf,

    /// Print the register file and the reserved-variable page after HALT
    #[arg(long)]
    dump: bool,

    /// Maximum number of instructions to execute
    #[arg(long)]
    max_steps: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut file = match fs::File::open(&cli.input) {
        Ok(file) => file,
        Err(e) => fail(format!("cannot open '{}': {}", cli.input.display(), e)),
    };
    let binary = match FlatBinary::read(&mut file) {
        Ok(binary) => binary,
        Err(e) => fail(format!("cannot load '{}': {}", cli.input.display(), e)),
    };

    let mut vm = match Vm::new(&binary) {
        Ok(vm) => vm,
        Err(e) => fail(e),
    };
    if let Some(steps) = cli.max_steps {
        vm.set_max_steps(steps);
    }

    // programs that read consume stdin
    let mut input = Vec::new();
    if std::io::stdin().read_to_end(&mut input).is_ok() && !input.is_empty() {
        vm.set_input(input);
    }

    let result = vm.run();
    let _ = vm.flush_output();

    if cli.dump {
        dump(&vm);
    }

    match result {
        Ok(()) => process::exit(vm.exit_code() as i32 & 0xFF),
        Err(e) => fail(e),
    }
}

fn dump(vm: &Vm) {
    eprintln!(
        "A=${:04x} B=${:04x} X=${:04x} Y=${:04x} SP=${:04x} PC=${:04x} STATUS=%{:08b}",
        vm.a, vm.b, vm.x, vm.y, vm.sp, vm.pc, vm.status
    );
    // the reserved-variable page is where globals live
    for row in (0x0100u16..0x0140).step_by(16) {
        let mut line = format!("${:04x}:", row);
        for offset in (0u16..16).step_by(2) {
            let word = vm.read_word(row + offset).unwrap_or(0);
            line.push_str(&format!(" {:04x}", word));
        }
        eprintln!("{}", line);
    }
}

fn fail(error: impl std::fmt::Display) -> ! {
    eprintln!("{}", error);
    process::exit(1);
}
