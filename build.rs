fn main() {
    tonic_build::configure()
        .build_server(false)
        .compile_protos(&["proto/utcp.proto"], &["proto"])
        .expect("compiling proto/utcp.proto");
}
