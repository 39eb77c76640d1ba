use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=LIBINSANE_LIB_DIR");
    println!("cargo:rerun-if-env-changed=LIBINSANE_STATIC");

    // The FFI driver is opt-in; the default build has no native dependency.
    if env::var_os("CARGO_FEATURE_LIBINSANE").is_none() {
        return;
    }

    if let Some(dir) = env::var_os("LIBINSANE_LIB_DIR") {
        println!(
            "cargo:rustc-link-search=native={}",
            std::path::Path::new(&dir).display()
        );
    }

    let kind = if env::var_os("LIBINSANE_STATIC").is_some() {
        "static"
    } else {
        "dylib"
    };
    println!("cargo:rustc-link-lib={kind}=insane");
}
