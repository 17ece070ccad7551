use boxy_importer::{read_raw_boxy, ChannelKind};
use ndarray::s;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    // Load AC and phase data from the same participant folder
    let raw_ac = read_raw_boxy("data/boxy_example/Participant-1", "AC", false)?;
    let raw_ph = read_raw_boxy("data/boxy_example/Participant-1", "Ph", false)?;

    println!("Sample rate: {} Hz", raw_ac.sample_rate());
    if let Some(freq) = raw_ac.modulation_frequency() {
        println!("Modulation frequency: {} Hz", freq);
    }
    println!("Number of channels: {}", raw_ac.n_channels());
    println!(
        "Samples: {} ({:.2} seconds)",
        raw_ac.n_samples(),
        raw_ac.duration()
    );

    for diagnostic in raw_ac.diagnostics() {
        println!("Warning: {}", diagnostic);
    }

    // List first few channels
    println!("\nChannels:");
    for channel in raw_ac.channels().iter().take(5) {
        println!("  {} ({})", channel.label, channel.kind.as_str());
    }
    if raw_ac.n_channels() > 5 {
        println!("  ... and {} more", raw_ac.n_channels() - 5);
    }

    // Labels end with the montage number
    let montage_a: Vec<&str> = raw_ac
        .channel_names()
        .into_iter()
        .filter(|label| label.ends_with("_1"))
        .collect();
    println!("\nMontage A has {} channels", montage_a.len());

    // Read the first ten seconds
    let stop = ((10.0 * raw_ac.sample_rate()) as usize).min(raw_ac.n_samples()).saturating_sub(1);
    let ac = raw_ac.read_segment(0, stop)?;
    let ph = raw_ph.read_segment(0, stop)?;
    println!("\nAC segment: {} channels x {} samples", ac.nrows(), ac.ncols());

    let num_samples = std::cmp::min(5, ac.ncols());
    let first_ac = ac.slice(s![0, ..num_samples]);
    let first_ph = ph.slice(s![0, ..num_samples]);
    println!("First channel (first {} samples):", num_samples);
    for i in 0..num_samples {
        println!("    {}: AC {:.3}  Ph {:.3}", i, first_ac[i], first_ph[i]);
    }

    assert!(raw_ph
        .channels()
        .iter()
        .all(|c| c.kind == ChannelKind::FnirsFdPhase));

    Ok(())
}
