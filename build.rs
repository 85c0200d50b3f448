fn main() {
    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let config = cbindgen::Config::from_file("cbindgen.toml").unwrap_or_default();

    if let Ok(bindings) = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        bindings.write_to_file(format!("{}/include/goio.h", crate_dir));
    }

    println!("cargo:rerun-if-env-changed=GOIO_SDK_DIR");
    println!("cargo:rerun-if-env-changed=GOIO_LIB_DIR");

    // Only the goio-sdk build links the vendor library.
    if std::env::var_os("CARGO_FEATURE_GOIO_SDK").is_some() {
        let lib_dir = std::env::var("GOIO_LIB_DIR").ok().or_else(|| {
            std::env::var("GOIO_SDK_DIR")
                .ok()
                .map(|dir| format!("{}/lib", dir))
        });

        match lib_dir {
            Some(dir) => println!("cargo:rustc-link-search=native={}", dir),
            None => println!(
                "cargo:warning=goio-sdk enabled without GOIO_SDK_DIR/GOIO_LIB_DIR; relying on the default linker path"
            ),
        }
    }
}
