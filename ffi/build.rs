//! Generates the C header for the `extern "C"` surface.
//!
//! The header is written to `$OUT_DIR/include/netlib.h`. Set
//! `NETLIB_HEADER_DIR` to also copy it somewhere a host build can pick up.

use std::env;
use std::error::Error;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/types.rs");
    println!("cargo:rerun-if-env-changed=NETLIB_HEADER_DIR");

    // a missing header must not break the library build
    if let Err(e) = generate() {
        println!("cargo:warning=header generation skipped: {e}");
    }
}

fn generate() -> Result<(), Box<dyn Error>> {
    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let out_dir = PathBuf::from(env::var("OUT_DIR")?).join("include");

    let bindings = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("NETLIB_H")
        .with_documentation(true)
        .generate()?;

    write_header(&bindings, &out_dir)?;
    if let Ok(dir) = env::var("NETLIB_HEADER_DIR") {
        write_header(&bindings, Path::new(&dir))?;
    }
    Ok(())
}

fn write_header(bindings: &cbindgen::Bindings, dir: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(dir)?;
    bindings.write(File::create(dir.join("netlib.h"))?);
    Ok(())
}
