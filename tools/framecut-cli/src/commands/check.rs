//! Check ffmpeg and font availability.

use framecut_common::config::AppConfig;
use framecut_export::engine::probe_version;
use framecut_export::{DirectoryFontSource, FontSource};

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Framecut System Check");
    println!("{}", "=".repeat(50));

    let binary = &config.engine.ffmpeg_binary;
    let engine_ok = match probe_version(binary).await {
        Ok(version) => {
            println!("[OK] Engine: {version}");
            true
        }
        Err(e) => {
            println!("[FAIL] Engine: {e}");
            false
        }
    };

    println!("     Work dir: {}", config.engine.work_dir.display());

    let font_dir = &config.fonts.dir;
    if font_dir.is_dir() {
        println!("[OK] Font directory: {}", font_dir.display());
    } else {
        println!("[WARN] Font directory missing: {}", font_dir.display());
    }

    let default_family = &config.fonts.default_family;
    let fonts = DirectoryFontSource::from_config(&config.fonts);
    let fonts_ok = match fonts.fetch(default_family).await {
        Ok(bytes) => {
            println!("[OK] Default font {default_family} ({} bytes)", bytes.len());
            true
        }
        Err(e) => {
            println!("[FAIL] Default font {default_family}: {e}");
            println!("       Exports cannot start until the default font is installed.");
            false
        }
    };

    println!();
    if engine_ok && fonts_ok {
        println!("All checks passed. Framecut is ready.");
    } else if engine_ok {
        println!("Install the default font or set fonts.default_family in the config.");
    } else {
        println!("ffmpeg is required. Install it or set engine.ffmpeg_binary in the config.");
    }

    Ok(())
}
