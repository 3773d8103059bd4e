// ABOUTME: Build script for generating Rust code from function_broker.proto.
// ABOUTME: Uses tonic-build to compile protobuf definitions into Rust types.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The server half is only used by tests that stand up a local broker
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto-src/function_broker.proto"], &["proto-src"])?;

    println!("cargo:rerun-if-changed=proto-src/function_broker.proto");

    Ok(())
}
