// demos/test_loader.rs
use boxy_importer::{DataType, LoadOptions, RawBoxy};
use std::env;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <path_to_boxy_folder_or_txt> [AC|DC|Ph] [--multi-file] [--strict]",
            args[0]
        );
        std::process::exit(1);
    }

    let path = &args[1];
    let data_type: DataType = match args.get(2).filter(|a| !a.starts_with("--")) {
        Some(dt) => match dt.parse() {
            Ok(dt) => dt,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        None => DataType::Ac,
    };
    let options = LoadOptions::new(data_type)
        .multi_file(args.iter().any(|a| a == "--multi-file"))
        .strict(args.iter().any(|a| a == "--strict"));

    println!("Loading from: {}", path);

    match RawBoxy::open(path, options) {
        Ok(raw) => {
            println!("\n✓ Successfully opened!");
            println!("  Sample rate: {} Hz", raw.sample_rate());
            println!("  Channels: {}", raw.n_channels());
            println!("  Duration: {:.2} seconds", raw.duration());

            for (i, montage) in raw.montages().iter().enumerate() {
                println!("  Montage {} ({}):", i + 1, montage.name);
                for (block, descriptor) in montage.blocks.iter().zip(&raw.descriptors()[i]) {
                    println!(
                        "    block {}: {} ({:?}, {} samples)",
                        block.name,
                        block.path.display(),
                        descriptor.layout,
                        descriptor.samples()
                    );
                }
            }

            for diagnostic in raw.diagnostics() {
                println!("  Warning: {}", diagnostic);
            }

            match raw.load_data() {
                Ok(data) => println!(
                    "\n  Data shape: {} channels × {} samples",
                    data.nrows(),
                    data.ncols()
                ),
                Err(e) => {
                    eprintln!("\n✗ Error reading data: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("\n✗ Error loading recording: {}", e);
            std::process::exit(1);
        }
    }
}
