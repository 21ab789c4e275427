// Integration tests for intake: media-type gating, dimension extraction and
// independent per-file rejection.

use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use svgpng_batch::config::IntakeConfig;
use svgpng_batch::{intake, Format, IntakeError, ItemStatus, RawFile, SessionPhase, SessionStore};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255])))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode fixture");
    buf
}

fn svg_bytes(width: u32, height: u32) -> Vec<u8> {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}"><circle cx="1" cy="1" r="1"/></svg>"#
    )
    .into_bytes()
}

#[tokio::test]
async fn test_intake_table_driven() {
    struct TestCase {
        name: &'static str,
        file: RawFile,
        expected: Result<(Format, u32, u32), IntakeError>,
    }

    let test_cases = vec![
        TestCase {
            name: "svg 64x64",
            file: RawFile::new("icon.svg", "image/svg+xml", svg_bytes(64, 64)),
            expected: Ok((Format::Svg, 64, 64)),
        },
        TestCase {
            name: "png 3x5",
            file: RawFile::new("photo.png", "image/png", png_bytes(3, 5)),
            expected: Ok((Format::Png, 3, 5)),
        },
        TestCase {
            name: "svg viewBox only",
            file: RawFile::new(
                "box.svg",
                "image/svg+xml",
                &br#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 40 20"/>"#[..],
            ),
            expected: Ok((Format::Svg, 40, 20)),
        },
        TestCase {
            name: "plain text",
            file: RawFile::new("notes.txt", "text/plain", &b"hi"[..]),
            expected: Err(IntakeError::InvalidFormat),
        },
        TestCase {
            name: "jpeg is not accepted",
            file: RawFile::new("photo.jpg", "image/jpeg", png_bytes(2, 2)),
            expected: Err(IntakeError::InvalidFormat),
        },
        TestCase {
            name: "png bytes declared as svg",
            file: RawFile::new("liar.svg", "image/svg+xml", png_bytes(2, 2)),
            expected: Err(IntakeError::UnreadableDimensions),
        },
        TestCase {
            name: "truncated png",
            file: RawFile::new("cut.png", "image/png", png_bytes(8, 8)[..20].to_vec()),
            expected: Err(IntakeError::UnreadableDimensions),
        },
    ];

    for tc in test_cases {
        let file_name = tc.file.name.clone();
        let outcome = intake(vec![tc.file], &IntakeConfig::default()).await;
        match tc.expected {
            Ok((format, width, height)) => {
                assert!(outcome.rejected.is_empty(), "{}: unexpected rejection", tc.name);
                let item = &outcome.accepted[0];
                assert_eq!(item.source_format(), format, "{}", tc.name);
                assert_eq!(item.target_format(), format.opposite(), "{}", tc.name);
                assert_eq!((item.width(), item.height()), (width, height), "{}", tc.name);
                assert_eq!(item.status(), &ItemStatus::Queued, "{}", tc.name);
                assert!(item.output_preview().is_none(), "{}", tc.name);
            }
            Err(reason) => {
                assert!(outcome.accepted.is_empty(), "{}: should not be accepted", tc.name);
                assert_eq!(outcome.rejected[0].reason, reason, "{}", tc.name);
                assert!(
                    outcome.rejected[0].to_string().starts_with(&file_name),
                    "{}: rejection should name the file",
                    tc.name
                );
            }
        }
    }
}

#[tokio::test]
async fn test_targets_are_always_opposite_formats() {
    let files: Vec<RawFile> = (1..=6)
        .map(|n| {
            if n % 2 == 0 {
                RawFile::new(format!("f{n}.png"), "image/png", png_bytes(n, n))
            } else {
                RawFile::new(format!("f{n}.svg"), "image/svg+xml", svg_bytes(n, n))
            }
        })
        .collect();

    let outcome = intake(files, &IntakeConfig::default()).await;
    assert_eq!(outcome.accepted.len(), 6);
    for (n, item) in (1..=6).zip(&outcome.accepted) {
        assert_eq!(item.file_name(), if n % 2 == 0 { format!("f{n}.png") } else { format!("f{n}.svg") });
        assert_ne!(item.source_format(), item.target_format());
    }

    let mut ids: Vec<_> = outcome.accepted.iter().map(|i| i.id()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6, "ids must be unique");
}

#[tokio::test]
async fn test_all_rejected_intake_keeps_session() {
    let store = SessionStore::new();
    store.ingest(intake(vec![RawFile::new("a.svg", "image/svg+xml", svg_bytes(4, 4))], &IntakeConfig::default()).await);

    let outcome = intake(
        vec![RawFile::new("readme.md", "text/markdown", &b"# hi"[..])],
        &IntakeConfig::default(),
    )
    .await;
    store.ingest(outcome);

    assert_eq!(store.len(), 1);
    assert_eq!(store.phase(), SessionPhase::Loaded);
    let rejections = store.rejections();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].to_string(), "readme.md: invalid file format.");
}

#[tokio::test]
async fn test_slow_decode_is_rejected_after_timeout() {
    // Twenty thousand shapes keep the parser busy far past 1 ms.
    let mut svg = String::from(r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">"#);
    for n in 0..20_000 {
        svg.push_str(&format!(r#"<rect x="{}" y="{}" width="1" height="1" fill="blue"/>"#, n % 100, n / 200));
    }
    svg.push_str("</svg>");

    let config = IntakeConfig {
        decode_timeout_ms: 1,
    };
    let outcome = intake(
        vec![
            RawFile::new("dense.svg", "image/svg+xml", svg.clone().into_bytes()),
            RawFile::new("notes.txt", "text/plain", &b"hi"[..]),
        ],
        &config,
    )
    .await;

    assert!(outcome.accepted.is_empty());
    assert_eq!(outcome.rejected.len(), 2);
    assert_eq!(outcome.rejected[0].to_string(), "dense.svg: cannot read image dimensions.");
    assert_eq!(outcome.rejected[1].reason, IntakeError::InvalidFormat);

    // The same document is fine once the decoder has time to finish.
    let outcome = intake(
        vec![RawFile::new("dense.svg", "image/svg+xml", svg.into_bytes())],
        &IntakeConfig::default(),
    )
    .await;
    assert_eq!(outcome.accepted.len(), 1);
    assert_eq!((outcome.accepted[0].width(), outcome.accepted[0].height()), (100, 100));
}
