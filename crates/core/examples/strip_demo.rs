//! Drive an equalizer strip from a separate control thread
//!
//! Run with: cargo run --package cascade-eq-core --example strip_demo

use cascade_eq_core::domain::filter::log_frequencies;
use cascade_eq_core::domain::{Equalizer, EqualizerConfig, ResponseListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("cascade_eq_core=debug,info")
        .init();

    println!("=== Cascade EQ Strip Demo ===\n");

    let config = EqualizerConfig::factory_default();
    let mut eq = Equalizer::new(&config)?;
    eq.prepare(48000.0, 512)?;
    println!("Built {} stages, {} parameters", eq.stages().len(), eq.blueprints().len());

    let redraws = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&redraws);
    let listener: Arc<dyn ResponseListener> = Arc::new(move |stage: &str| {
        counter.fetch_add(1, Ordering::Relaxed);
        println!("  redraw requested by {stage}");
    });
    eq.handle().add_listener(listener);

    // Control-side automation runs off the audio thread
    let handle = eq.handle().clone();
    tokio::task::spawn_blocking(move || {
        for (id, value) in [
            ("high2-order", 4.0),
            ("high2-freq", 120.0),
            ("peak2-gain", -4.5),
            ("peak2-q", 2.0),
            ("low2-shelf", 1.0),
            ("low2-shelf-gain", -3.0),
        ] {
            if let Err(e) = handle.parameter_changed(id, value) {
                eprintln!("{e}");
            }
        }
    })
    .await?;

    // About one second of a 440 Hz tone through the strip
    let mut block = vec![0.0f32; 512];
    for n in 0..94 {
        for (i, sample) in block.iter_mut().enumerate() {
            let t = (n * 512 + i) as f32 / 48000.0;
            *sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        }
        eq.process_block(&mut block);
    }

    println!("\nCombined response ({} redraws):", redraws.load(Ordering::Relaxed));
    let freqs = log_frequencies(20.0, 20000.0, 11);
    let mut db = vec![0.0; freqs.len()];
    eq.get_magnitude_response(&freqs, &mut db);
    for (f, db) in freqs.iter().zip(&db) {
        println!("  {f:>8.1} Hz  {db:+6.2} dB");
    }

    let path = std::env::temp_dir().join("cascade_eq_demo.toml");
    eq.to_config().save_to_file(&path).await?;
    println!("\nSaved strip to {}", path.display());

    Ok(())
}
