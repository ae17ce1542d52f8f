fn main() -> Result<(), Box<dyn std::error::Error>> {
    unsafe {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_build::configure()
        .build_server(false) // We only need the client
        .compile_protos(&["proto/telemetry.proto"], &["proto/"])?;
    Ok(())
}
