fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=ARLFFI_LIB_DIR");

    // Add build-time information to the "built.rs" file in OUT_DIR.
    built::write_built_file().expect("Failed to acquire build-time information");

    // Tell cargo to tell rustc to link the ARL C wrapper shared library.
    if std::env::var_os("CARGO_FEATURE_ARL").is_some() {
        if let Some(lib_dir) = std::env::var_os("ARLFFI_LIB_DIR") {
            println!(
                "cargo:rustc-link-search=native={}",
                lib_dir.to_string_lossy()
            );
        }
        println!("cargo:rustc-link-lib=dylib=arlffi");
    }
}
