use std::fs;
use std::io::Cursor;
use std::path::Path;

use exif::{In, Reader, Tag, Value};
use gpmeta_core::exif_block::DATETIME_FORMAT;
use gpmeta_core::geo::decode_rationals;
use gpmeta_core::sidecar::local_time;
use gpmeta_core::{process, ProcessOptions, ProcessResult, RetirePolicy};
use tempfile::tempdir;

fn write_jpeg(path: &Path) {
    image::RgbImage::from_pixel(8, 8, image::Rgb([90, 60, 30]))
        .save_with_format(path, image::ImageFormat::Jpeg)
        .unwrap();
}

fn run(options: &ProcessOptions) -> ProcessResult {
    process(options, &|_, _, _, _| {}).unwrap()
}

fn read_exif(path: &Path) -> Option<exif::Exif> {
    let bytes = fs::read(path).unwrap();
    Reader::new().read_from_container(&mut Cursor::new(&bytes)).ok()
}

fn ascii(exif: &exif::Exif, tag: Tag) -> Vec<u8> {
    match &exif.get_field(tag, In::PRIMARY).unwrap().value {
        Value::Ascii(v) => v[0].clone(),
        other => panic!("{tag} is not ascii: {other:?}"),
    }
}

fn degrees(exif: &exif::Exif, tag: Tag) -> f64 {
    match &exif.get_field(tag, In::PRIMARY).unwrap().value {
        Value::Rational(v) => decode_rationals(v).unwrap(),
        other => panic!("{tag} is not rational: {other:?}"),
    }
}

fn mtime(path: &Path) -> i64 {
    filetime::FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

#[test]
fn end_to_end_image_with_geo() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("a.jpg");
    let sidecar = dir.path().join("a.json");
    write_jpeg(&image);
    fs::write(
        &sidecar,
        r#"{"title": "a.jpg",
            "photoTakenTime": {"timestamp": "1700000000"},
            "geoData": {"latitude": 48.1, "longitude": 11.5, "altitude": 0.0}}"#,
    )
    .unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.sidecars_found, 1);
    assert_eq!(result.sidecars_retired, 1);
    assert_eq!(result.media_fused, 1);
    assert_eq!(result.failures, 0);

    let expected = local_time(1_700_000_000)
        .unwrap()
        .format(DATETIME_FORMAT)
        .to_string();
    let exif = read_exif(&image).unwrap();
    for tag in [Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized] {
        assert_eq!(ascii(&exif, tag), expected.as_bytes());
    }
    assert_eq!(ascii(&exif, Tag::GPSLatitudeRef), b"N");
    assert_eq!(ascii(&exif, Tag::GPSLongitudeRef), b"E");
    let tolerance = 1.0 / 360_000.0 + 1e-9;
    assert!((degrees(&exif, Tag::GPSLatitude) - 48.1).abs() <= tolerance);
    assert!((degrees(&exif, Tag::GPSLongitude) - 11.5).abs() <= tolerance);
    assert!(exif.get_field(Tag::GPSAltitude, In::PRIMARY).is_some());

    assert_eq!(mtime(&image), 1_700_000_000);
    assert!(!sidecar.exists());
}

#[test]
fn malformed_sidecar_does_not_block_others() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    let image = dir.path().join("good.jpg");
    write_jpeg(&image);
    fs::write(
        dir.path().join("good.jpg.json"),
        r#"{"title": "good.jpg", "creationTime": {"timestamp": 1600000000}}"#,
    )
    .unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.sidecars_found, 2);
    assert_eq!(result.sidecars_retired, 1);
    assert_eq!(result.sidecars_kept, 1);
    assert_eq!(result.failures, 1);
    assert!(dir.path().join("broken.json").exists());
    assert!(!dir.path().join("good.jpg.json").exists());
    assert_eq!(mtime(&image), 1_600_000_000);
}

#[test]
fn mangled_name_is_matched_by_stem() {
    let dir = tempdir().unwrap();
    let mangled = dir.path().join("IMG_0002-edited-suffix.jpg");
    write_jpeg(&mangled);
    let sidecar = dir.path().join("IMG_0002.json");
    fs::write(
        &sidecar,
        r#"{"title": "IMG_0002.jpg", "photoTakenTime": {"timestamp": "1500000000"}}"#,
    )
    .unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.media_fused, 1);
    assert!(!sidecar.exists());
    let exif = read_exif(&mangled).unwrap();
    let expected = local_time(1_500_000_000).unwrap().format(DATETIME_FORMAT).to_string();
    assert_eq!(ascii(&exif, Tag::DateTimeOriginal), expected.as_bytes());
}

#[test]
fn exact_match_propagates_to_derived_files() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("IMG_1.jpg");
    let edited = dir.path().join("IMG_1-edited.jpg");
    let duplicate = dir.path().join("IMG_1(1).jpg");
    let clip = dir.path().join("IMG_1.MP4");
    write_jpeg(&image);
    write_jpeg(&edited);
    write_jpeg(&duplicate);
    fs::write(&clip, b"motion").unwrap();
    fs::write(
        dir.path().join("IMG_1.jpg.json"),
        r#"{"title": "IMG_1.jpg", "photoTakenTime": {"timestamp": "1400000000"}}"#,
    )
    .unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.media_fused, 1);
    assert_eq!(result.variants_fused, 2);
    assert_eq!(result.sidecars_retired, 1);

    assert!(read_exif(&image).is_some());
    assert!(read_exif(&edited).is_some());
    assert!(read_exif(&duplicate).is_none());
    assert_eq!(mtime(&clip), 1_400_000_000);
    assert_eq!(fs::read(&clip).unwrap(), b"motion");
}

#[test]
fn video_gets_timestamps_and_retires_sidecar() {
    let dir = tempdir().unwrap();
    let clip = dir.path().join("VID_7.mp4");
    fs::write(&clip, b"video").unwrap();
    let sidecar = dir.path().join("VID_7.mp4.json");
    fs::write(
        &sidecar,
        r#"{"title": "VID_7.mp4", "photoTakenTime": {"timestamp": "1300000000"},
            "geoData": {"latitude": 1.0, "longitude": 2.0}}"#,
    )
    .unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.media_fused, 1);
    assert_eq!(mtime(&clip), 1_300_000_000);
    assert_eq!(fs::read(&clip).unwrap(), b"video");
    assert!(!sidecar.exists());
}

#[test]
fn missing_timestamp_respects_retire_policy() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("p.jpg");
    write_jpeg(&image);
    let original = fs::read(&image).unwrap();
    let sidecar = dir.path().join("p.jpg.json");
    fs::write(&sidecar, r#"{"title": "p.jpg"}"#).unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.media_fused, 0);
    assert_eq!(result.failures, 1);
    assert!(sidecar.exists());
    assert_eq!(fs::read(&image).unwrap(), original);

    let mut lenient = ProcessOptions::new(dir.path());
    lenient.retire_policy = RetirePolicy::Lenient;
    let result = run(&lenient);
    assert_eq!(result.sidecars_retired, 1);
    assert!(!sidecar.exists());
    assert_eq!(fs::read(&image).unwrap(), original);
}

#[test]
fn failed_image_write_keeps_sidecar_and_original() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("bad.jpg");
    fs::write(&image, b"truncated export").unwrap();
    let sidecar = dir.path().join("bad.jpg.json");
    fs::write(
        &sidecar,
        r#"{"title": "bad.jpg", "photoTakenTime": {"timestamp": "1200000000"}}"#,
    )
    .unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.failures, 1);
    assert_eq!(result.sidecars_kept, 1);
    assert!(sidecar.exists());
    assert_eq!(fs::read(&image).unwrap(), b"truncated export");
}

#[test]
fn unmatched_and_untitled_sidecars_stay() {
    let dir = tempdir().unwrap();
    let orphan = dir.path().join("gone.jpg.json");
    fs::write(
        &orphan,
        r#"{"title": "gone.jpg", "photoTakenTime": {"timestamp": "1"}}"#,
    )
    .unwrap();
    let album = dir.path().join("print-subscriptions.json");
    fs::write(&album, r#"{"subscriptions": []}"#).unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.sidecars_kept, 2);
    // the untitled file is skipped quietly, the orphan is reported
    assert_eq!(result.failures, 1);
    assert!(orphan.exists());
    assert!(album.exists());
}

#[test]
fn dry_run_touches_nothing() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("d.jpg");
    write_jpeg(&image);
    let original = fs::read(&image).unwrap();
    let before = mtime(&image);
    let sidecar = dir.path().join("d.jpg.json");
    fs::write(
        &sidecar,
        r#"{"title": "d.jpg", "photoTakenTime": {"timestamp": "1100000000"}}"#,
    )
    .unwrap();

    let mut options = ProcessOptions::new(dir.path());
    options.dry_run = true;
    let result = run(&options);
    assert_eq!(result.media_fused, 1);
    assert_eq!(result.sidecars_retired, 1);
    assert!(sidecar.exists());
    assert_eq!(fs::read(&image).unwrap(), original);
    assert_eq!(mtime(&image), before);
}

#[test]
fn missing_root_is_fatal() {
    let dir = tempdir().unwrap();
    let options = ProcessOptions::new(dir.path().join("absent"));
    assert!(process(&options, &|_, _, _, _| {}).is_err());
}

#[test]
fn glob_route_retirement_follows_policy_when_every_match_fails() {
    let dir = tempdir().unwrap();
    let broken = dir.path().join("IMG_9-x.jpg");
    fs::write(&broken, b"not an image").unwrap();
    let sidecar = dir.path().join("IMG_9.json");
    fs::write(
        &sidecar,
        r#"{"title": "IMG_9.jpg", "photoTakenTime": {"timestamp": "1000000000"}}"#,
    )
    .unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.failures, 1);
    assert_eq!(result.sidecars_retired, 0);
    assert!(sidecar.exists());

    let mut lenient = ProcessOptions::new(dir.path());
    lenient.retire_policy = RetirePolicy::Lenient;
    let result = run(&lenient);
    assert_eq!(result.sidecars_retired, 1);
    assert!(!sidecar.exists());
    assert_eq!(fs::read(&broken).unwrap(), b"not an image");
}

#[test]
fn glob_route_fuses_companion_of_dotted_sidecar() {
    let dir = tempdir().unwrap();
    let still = dir.path().join("PXL_5.jpg(1).jpg");
    write_jpeg(&still);
    let clip = dir.path().join("PXL_5.MP4");
    fs::write(&clip, b"motion").unwrap();
    let sidecar = dir.path().join("PXL_5.jpg.json");
    fs::write(
        &sidecar,
        r#"{"title": "PXL_5.jpg", "photoTakenTime": {"timestamp": "1650000000"}}"#,
    )
    .unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    assert_eq!(result.media_fused, 2);
    assert_eq!(result.variants_fused, 0);
    assert!(read_exif(&still).is_some());
    assert_eq!(mtime(&clip), 1_650_000_000);
    assert!(!sidecar.exists());
}

#[test]
fn glob_route_does_not_propagate_edited_variants() {
    let dir = tempdir().unwrap();
    let still = dir.path().join("IMG_3~1.jpg");
    let edited = dir.path().join("IMG_3~1-edited.jpg");
    write_jpeg(&still);
    write_jpeg(&edited);
    fs::write(
        dir.path().join("IMG_3.json"),
        r#"{"title": "IMG_3.jpg", "photoTakenTime": {"timestamp": "1550000000"}}"#,
    )
    .unwrap();

    let result = run(&ProcessOptions::new(dir.path()));
    // both are stem matches in their own right; neither is fused a second time
    assert_eq!(result.media_fused, 2);
    assert_eq!(result.variants_fused, 0);
    assert!(read_exif(&edited).is_some());
}

#[test]
fn progress_callback_may_borrow_locals() {
    let dir = tempdir().unwrap();
    write_jpeg(&dir.path().join("c.jpg"));
    fs::write(
        dir.path().join("c.jpg.json"),
        r#"{"title": "c.jpg", "photoTakenTime": {"timestamp": "1000"}}"#,
    )
    .unwrap();

    let seen = std::sync::Mutex::new(Vec::new());
    let result = process(&ProcessOptions::new(dir.path()), &|stage, current, total, _| {
        seen.lock().unwrap().push((stage.to_string(), current, total));
    })
    .unwrap();
    assert_eq!(result.media_fused, 1);

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.last(), Some(&("fuse".to_string(), 1, 1)));
}
