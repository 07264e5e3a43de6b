// Regenerates the `videodev2.h` bindings checked in next to this crate. Run from this directory:
//
// cargo run -- -o ../videodev2_64.rs -I /path/to/kerneldir/usr/include/
// cargo run -- -o ../videodev2_32.rs -I /path/to/kerneldir/usr/include/ -s /usr/i686-linux-gnu/ -t i686-linux-gnu
use clap::Parser;
use std::fs;

include!("../../../../bindgen.rs");

#[derive(Parser)]
struct Cli {
    /// Sets a custom input file
    #[arg(short, long, value_name = "INPUT FILE", default_value = "fix753.h")]
    input_file: String,

    /// Sets a custom output file
    #[arg(short, long, value_name = "OUTPUT FILE", default_value = "bindings.rs")]
    output_file: String,

    /// Sets the include file for which to generate bindings
    #[arg(
        short,
        long,
        value_name = "BINDINGS FOR",
        default_value = "linux/videodev2.h"
    )]
    bindings_for: String,

    /// Flag to keep the actual input presented to bindgen
    #[arg(short, long, default_value_t = false)]
    keep_actual_input: bool,

    /// Sets include path for clang
    #[arg(
        short = 'I',
        long,
        value_name = "INCLUDE PATH",
        default_value = "/usr/include"
    )]
    include_path: String,

    /// Sets sysroot for clang
    #[arg(short, long, value_name = "SYSROOT PATH", default_value = "/")]
    sysroot: String,

    /// Sets target for clang
    #[arg(short = 't', long, value_name = "CLANG TARGET")]
    clang_target: Option<String>,
}

const ACTUAL_BINDGEN_INPUT_FILE: &str = "actual_bindgen_input.h";

fn main() {
    let cli = Cli::parse();

    let mut clang_args = vec![
        format!("-I{}", cli.include_path),
        format!("--sysroot={}", cli.sysroot),
    ];
    if let Some(clang_target) = cli.clang_target {
        clang_args.push(format!("--target={}", clang_target));
    }

    println!("input file:{}", cli.input_file);
    println!("output file:{}", cli.output_file);
    println!("bindings for:{}", cli.bindings_for);
    println!("clang args:{:?}", clang_args);

    let fix_file = fs::read_to_string(&cli.input_file).expect("Unable to read file");

    let actual_input = format!(
        "#include \"{}/{}\"\n\
         #define MARK_FIX_753(name) const unsigned long int Fix753_##name = name;\n\
         {}",
        cli.include_path, cli.bindings_for, fix_file
    );

    fs::write(ACTUAL_BINDGEN_INPUT_FILE, actual_input).expect("Unable to write to file");

    let bindings = loopcam_bindgen_builder(bindgen::Builder::default())
        .header(ACTUAL_BINDGEN_INPUT_FILE)
        .clang_args(clang_args)
        .generate()
        .expect("Unable to generate bindings");

    bindings
        .write_to_file(cli.output_file)
        .expect("Couldn't write bindings");

    if !cli.keep_actual_input {
        fs::remove_file(ACTUAL_BINDGEN_INPUT_FILE).expect("Unable to remove actual bindgen input");
    }
}
