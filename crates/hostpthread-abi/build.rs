fn main() {
    println!("cargo:rerun-if-changed=version_scripts/hostpthread.map");
    // Only the unmangled build has POSIX names worth versioning.
    if std::env::var_os("CARGO_FEATURE_EXPORT_SYMBOLS").is_none() {
        return;
    }
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let version_script = format!("{manifest_dir}/version_scripts/hostpthread.map");
    if std::path::Path::new(&version_script).exists() {
        println!("cargo:rustc-cdylib-link-arg=-Wl,--version-script={version_script}");
    }
}
