//! End-to-end conversion through a stand-in `wimgt` shell script.

#![cfg(unix)]

use image::{Rgba, RgbaImage};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

use ubitex::ckd::{CkdInfo, RecordKind};
use ubitex::scratch::ScratchDir;
use ubitex::textures::{SrgbNormalizer, Stage, ToolOutputError, WimgtEncoder};
use ubitex::{ConversionJob, ConvertError, ConvertOptions, Converter, ErrorKind};

/// Logs its arguments, then writes a stripped TPL with 4 KiB of payload.
const FAKE_WIMGT: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
dest="$8"
printf '\000\040\257\060\000\000\000\001' > "$dest"
head -c 56 /dev/zero >> "$dest"
head -c 4096 /dev/zero >> "$dest"
"#;

const BROKEN_WIMGT: &str = "#!/bin/sh\nprintf 'RIFF0000' > \"$8\"\nexit 0\n";

struct Fixture {
    dir: tempfile::TempDir,
    tool: PathBuf,
}

impl Fixture {
    fn new(script: &str) -> Self {
        let dir = tempdir().unwrap();
        let tool_dir = dir.path().join("tool");
        fs::create_dir(&tool_dir).unwrap();
        let tool = tool_dir.join("wimgt");
        fs::write(&tool, script).unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, tool }
    }

    fn inputs(&self) -> PathBuf {
        let path = self.dir.path().join("in");
        fs::create_dir_all(&path).unwrap();
        path
    }

    fn scratch(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    fn converter(&self, options: ConvertOptions) -> Converter {
        let normalizer = Arc::new(SrgbNormalizer::new().unwrap());
        let encoder = WimgtEncoder::new(
            &self.tool,
            Arc::new(ScratchDir::new(self.scratch())),
            normalizer.clone(),
        );
        Converter::new(Arc::new(encoder), normalizer, options)
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.tool.with_file_name("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn write_image(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
    let img = RgbaImage::from_fn(w, h, |x, _| Rgba([x as u8, 64, 128, if x == 0 { 0 } else { 255 }]));
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

#[test]
fn batch_converts_valid_images_and_reports_the_rest() {
    let fx = Fixture::new(FAKE_WIMGT);
    let inputs = fx.inputs();
    write_image(&inputs, "a.png", 8, 8);
    write_image(&inputs, "b.png", 7, 8);
    write_image(&inputs, "c.png", 32, 16);

    let out_dir = fx.dir.path().join("out");
    let options = ConvertOptions {
        output_dir: Some(out_dir.clone()),
        ..Default::default()
    };
    let conv = fx.converter(options);

    let pattern = format!("{}/*.png", inputs.display());
    let jobs: Vec<_> = ubitex::paths::expand_inputs(&pattern)
        .unwrap()
        .into_iter()
        .map(|input| ConversionJob::new(input, conv.options()))
        .collect();
    assert_eq!(jobs.len(), 3);

    let report = conv.run_batch(&jobs);
    assert_eq!(report.converted.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].error.kind(), ErrorKind::InputValidation);

    for name in ["a.tga.ckd", "c.tga.ckd"] {
        let data = fs::read(out_dir.join(name)).unwrap();
        let info = CkdInfo::parse(&data).unwrap();
        assert_eq!(info.kind, RecordKind::Single);
        assert_eq!(info.payload_len, 4096);
    }
    assert!(!out_dir.join("b.tga.ckd").exists());

    // The odd image never reached the encoder
    let calls = fx.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.starts_with("ENCODE ")));

    drop(conv);
    assert!(!fx.scratch().exists());
}

#[test]
fn masked_texture_uses_copy_on_the_canvas() {
    let fx = Fixture::new(FAKE_WIMGT);
    let input = write_image(&fx.inputs(), "leaf.png", 16, 16);
    let options = ConvertOptions {
        masked: true,
        ..Default::default()
    };
    let conv = fx.converter(options);

    let job = ConversionJob::new(&input, conv.options());
    let done = conv.convert(&job).unwrap();
    assert_eq!(done.kind, RecordKind::Masked);

    let info = CkdInfo::parse(&fs::read(&job.output).unwrap()).unwrap();
    assert_eq!(info.kind, RecordKind::Masked);
    assert_eq!((info.width, info.height), (16, 16));

    let calls = fx.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("COPY "));
    assert!(calls[0].contains("--transform tpl.cmpr --overwrite --strip --dest"));
}

#[test]
fn bad_encoder_output_leaves_no_container() {
    let fx = Fixture::new(BROKEN_WIMGT);
    let input = write_image(&fx.inputs(), "hero.png", 8, 8);
    let conv = fx.converter(ConvertOptions::default());

    let job = ConversionJob::new(&input, conv.options());
    let err = conv.convert(&job).unwrap_err();

    assert!(matches!(
        err,
        ConvertError::InvalidToolOutput {
            stage: Stage::Texture,
            source: ToolOutputError::BadMagic { container: "TPL", .. }
        }
    ));
    assert_eq!(err.kind(), ErrorKind::ExternalTool);
    assert!(!job.output.exists());

    // The rejected output is kept for inspection
    let kept: Vec<_> = fs::read_dir(fx.scratch()).unwrap().collect();
    assert_eq!(kept.len(), 1);
}
