fn main() {
    csi_aoa_pipeline::cli::run();
}
