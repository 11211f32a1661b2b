use anyhow::Context;
use featkit::app::{load_config, run_detection, DetectionConfig};
use std::path::PathBuf;

const USAGE: &str = "usage: detect_features <image|config.json> [--cascade FILE] \
[--blobs K] [--template FILE] [--lbp FILE] [--descriptors FILE] [--no-freak]";

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let input: PathBuf = args.next().context(USAGE)?.into();

    let mut cfg = if input.extension().is_some_and(|e| e == "json") {
        load_config(&input)?
    } else {
        DetectionConfig::for_image(&input)
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--cascade" => {
                cfg.cascade = Some(args.next().context("expected a path after --cascade")?.into());
            }
            "--blobs" => {
                let v = args.next().context("expected an integer after --blobs")?;
                let k: usize = v
                    .parse()
                    .context("could not parse cluster count (use integer >= 1)")?;
                if k == 0 {
                    anyhow::bail!("cluster count must be >= 1");
                }
                cfg.blob_k = Some(k);
            }
            "--template" => {
                cfg.template = Some(args.next().context("expected a path after --template")?.into());
            }
            "--lbp" => {
                cfg.output_lbp = Some(args.next().context("expected a path after --lbp")?.into());
            }
            "--descriptors" => {
                cfg.output_descriptors = Some(
                    args.next()
                        .context("expected a path after --descriptors")?
                        .into(),
                );
            }
            "--no-freak" => cfg.freak = None,
            other => anyhow::bail!("unknown argument: {other}\n{USAGE}"),
        }
    }

    let dump = run_detection(cfg)?;

    println!("image {}x{} pixels", dump.width, dump.height);
    println!("cascade: {:6.2} ms, {} objects", dump.cascade_ms, dump.objects.len());
    println!("   fast: {:6.2} ms, {} keypoints", dump.fast_ms, dump.keypoints.len());
    println!("  freak: {:6.2} ms, {} described", dump.freak_ms, dump.described);
    println!("  blobs: {:6.2} ms, {} blobs", dump.blob_ms, dump.blobs.len());
    match dump.template_match {
        Some(m) => println!(
            "template: {:5.2} ms, score {:.3} at {:?}",
            dump.template_ms, m.score, m.rect
        ),
        None => println!("template: {:5.2} ms, no match", dump.template_ms),
    }
    for w in &dump.warnings {
        eprintln!("warning: {w}");
    }

    Ok(())
}
