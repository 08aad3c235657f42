use std::{env, fs, path::PathBuf};

// Copy settings.json next to the built binary.
fn main() {
    println!("cargo:rerun-if-changed=settings.json");

    let Ok(out_dir) = env::var("OUT_DIR") else { return };
    let Some(target_dir) = PathBuf::from(out_dir).ancestors().nth(3).map(PathBuf::from) else { return };

    if let Err(e) = fs::copy("settings.json", target_dir.join("settings.json")) {
        println!("cargo:warning=settings.json not copied: {e}");
    }
}
