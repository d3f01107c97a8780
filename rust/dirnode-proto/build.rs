fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("dirnode_descriptor.bin");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(&descriptor_path)
        .compile(
            &[
                "proto/dirnode/store.proto",
                "proto/dirnode/routing.proto",
                "proto/dirnode/search.proto",
                "proto/dirnode/sync.proto",
            ],
            &["proto"],
        )?;

    Ok(())
}
