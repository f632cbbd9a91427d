use std::env;
use std::path::{Path, PathBuf};

const WATCHED_VARIABLES: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"];

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // ffmpeg-sys-next finds the libraries through pkg-config everywhere but
    // Windows, where the only reliable source is an explicit FFMPEG_DIR.
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=framesync needs the FFmpeg development libraries. Set FFMPEG_DIR (or VCPKG_ROOT) before building on Windows."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let install_dir = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    report_vcpkg_install(&install_dir);
}

fn report_vcpkg_install(install_dir: &Path) {
    if !install_dir.join("include").join("libavformat").exists() {
        println!(
            "cargo:warning=VCPKG_ROOT is set but {} has no FFmpeg headers (vcpkg install ffmpeg).",
            install_dir.display(),
        );
        return;
    }

    println!(
        "cargo:warning=Found vcpkg FFmpeg at {0}; export FFMPEG_DIR={0} to make discovery explicit.",
        install_dir.display(),
    );
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        println!("cargo:warning=Set VCPKGRS_DYNAMIC=1 when linking against a dynamic vcpkg FFmpeg.");
    }
}
