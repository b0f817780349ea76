use gwc_api::v1::WrappedGateway;
use kube::CustomResourceExt;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=../api/src");

    let out_dir = std::env::var("CARGO_MANIFEST_DIR")?;
    write_crds(&out_dir)
}

fn write_crds(out_dir: &str) -> Result<(), Box<dyn Error>> {
    let dest_path = Path::new(out_dir).join("crds.yaml");
    let mut output = File::create(dest_path)?;

    for crd in [WrappedGateway::crd()] {
        writeln!(output, "---")?;
        writeln!(output, "{}", serde_yaml::to_string(&crd)?)?;
    }
    Ok(())
}
