use std::{env, fs, path::PathBuf};

// Only the firmware build needs the linker script and the vendor SDK archive
fn main() {
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-env-changed=MSDK_LIB_DIR");

    if env::var_os("CARGO_FEATURE_FIRMWARE").is_none() {
        return;
    }

    // Put `memory.x` somewhere the cortex-m-rt linker script can find it
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    fs::copy("memory.x", out.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    let target = env::var("TARGET").unwrap_or_default();
    if target.starts_with("thumb") {
        println!("cargo:rustc-link-arg-bins=-Tlink.x");

        // Camera, CNN, I2C and delay drivers come from the Maxim SDK, prebuilt as a static archive
        if let Some(dir) = env::var_os("MSDK_LIB_DIR") {
            println!("cargo:rustc-link-search={}", PathBuf::from(dir).display());
            println!("cargo:rustc-link-lib=static=max78000_msdk");
        }
    }
}
