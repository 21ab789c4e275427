use assert_cmd::Command;
use image::{ImageFormat, Rgba, RgbaImage};
use predicates::prelude::*;
use std::fs::write;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10"><rect width="20" height="10" fill="red"/></svg>"#;

/// A working directory holding one SVG, one PNG and a config that skips
/// system fonts.
fn fixture_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("Creating temp dir failed");
    write(dir.path().join("shape.svg"), SVG).expect("Writing svg fixture failed");

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([0, 128, 0, 255])))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .expect("Encoding png fixture failed");
    write(dir.path().join("dot.png"), png).expect("Writing png fixture failed");

    write(dir.path().join("config.yaml"), "render:\n  load_system_fonts: false\n")
        .expect("Writing config failed");
    dir
}

fn convert_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("svgpng-batch").expect("Binary exists");
    cmd.current_dir(dir)
        .env_remove("SVGPNG_BATCH_CONFIG")
        .arg("convert")
        .arg("--config")
        .arg("config.yaml")
        .arg("--output-dir")
        .arg("out");
    cmd
}

#[test]
fn convert_cli_saves_individual_outputs() {
    let dir = fixture_dir();

    convert_cmd(dir.path())
        .arg("shape.svg")
        .arg("dot.png")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("CONVERTED\tshape.svg")
                .and(predicate::str::contains("CONVERTED\tdot.png"))
                .and(predicate::str::contains("2 converted, 0 failed, 2 total")),
        );

    let out = dir.path().join("out");
    let png = std::fs::read(out.join("shape-converted.png")).expect("png written");
    let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).expect("png decodes");
    assert_eq!((decoded.width(), decoded.height()), (20, 10));

    let svg = std::fs::read_to_string(out.join("dot-converted.svg")).expect("svg written");
    assert!(svg.contains("data:image/png;base64,"));
}

#[test]
fn convert_cli_writes_one_archive_with_zip_flag() {
    let dir = fixture_dir();

    convert_cmd(dir.path())
        .arg("--zip")
        .arg("shape.svg")
        .arg("dot.png")
        .assert()
        .success()
        .stdout(predicate::str::contains("archive: "));

    let archives: Vec<_> = std::fs::read_dir(dir.path().join("out"))
        .expect("output dir exists")
        .map(|entry| entry.expect("dir entry").path())
        .collect();
    assert_eq!(archives.len(), 1, "exactly one file expected: {archives:?}");
    let name = archives[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("converted-images-") && name.ends_with(".zip"), "{name}");

    let bytes = std::fs::read(&archives[0]).expect("read archive");
    let archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort();
    assert_eq!(names, vec!["dot-converted.svg", "shape-converted.png"]);
}

#[test]
fn convert_cli_reports_rejections_and_keeps_going() {
    let dir = fixture_dir();
    write(dir.path().join("notes.txt"), "hello").expect("Writing text fixture failed");

    convert_cmd(dir.path())
        .arg("notes.txt")
        .arg("shape.svg")
        .arg("missing.png")
        .assert()
        .success()
        .stderr(
            predicate::str::contains("rejected: notes.txt: invalid file format.")
                .and(predicate::str::contains("rejected: missing.png: failed to read file.")),
        )
        .stdout(predicate::str::contains("1 converted, 0 failed, 1 total"));
}

#[test]
fn convert_cli_fails_when_nothing_is_accepted() {
    let dir = fixture_dir();
    write(dir.path().join("notes.txt"), "hello").expect("Writing text fixture failed");

    convert_cmd(dir.path())
        .arg("notes.txt")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid file format."));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use svgpng_batch_cli::cli::{run, Cli, Commands};

    // An input that does not exist: the run fails, but only after tracing starts.
    let cli = Cli {
        command: Commands::Convert {
            inputs: vec![std::path::PathBuf::from("does-not-exist.svg")],
            config: None,
            output_dir: None,
            zip: false,
        },
    };

    let result = run(cli).await;
    assert!(result.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
