use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the CSI driver provider protocol (v1alpha1).
    // Version matched to tonic / prost 0.14 in Cargo.toml.
    println!("cargo:rerun-if-changed=proto/v1alpha1/service.proto");
    tonic_prost_build::configure()
        .build_client(false)
        .build_server(true)
        .compile_protos(&["proto/v1alpha1/service.proto"], &["proto"])?;

    // Toolchain version reported by `--version`.
    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=PROVIDER_RUSTC_VERSION={}", rustc_version);
    println!("cargo:rerun-if-env-changed=PROVIDER_BUILD_DATE");

    Ok(())
}
