//! End-to-end conversion through the command-line exporter, with a shell
//! script standing in for the export toolkit.

#![cfg(unix)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use kfops_core::ConvertConfig;
use kfops_ml::convert::archive_output_path;
use kfops_ml::{ConversionStage, ConvertError, ConvertRequest, ModelConverter};
use proptest::prelude::*;

fn write_checkpoint(path: &Path) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let opts = zip::write::SimpleFileOptions::default();
    zip.add_directory("tokenizer/", opts).unwrap();
    zip.start_file("tokenizer/spiece.model", opts).unwrap();
    zip.write_all(b"sentencepiece").unwrap();
    zip.start_file("config.json", opts).unwrap();
    zip.write_all(br#"{"model_type": "t5", "d_model": 512}"#).unwrap();
    zip.finish().unwrap();
}

/// Exporter script: fails unless the checkpoint was extracted, then writes an
/// optimum-style layout.
fn shell_exporter_config() -> ConvertConfig {
    let script = concat!(
        "test -f {model_dir}/config.json || { echo 'missing config' >&2; exit 2; }; ",
        "mkdir -p {output_dir} && ",
        "echo {task} > {output_dir}/task.txt && ",
        "head -c 20000 /dev/zero > {output_dir}/encoder_model.onnx && ",
        "head -c 20000 /dev/zero > {output_dir}/decoder_model.onnx && ",
        "cp {model_dir}/config.json {output_dir}/config.json"
    );
    ConvertConfig {
        exporter_program: "sh".to_string(),
        exporter_args: vec!["-c".to_string(), script.to_string()],
        preflight: false,
        timeout_secs: 60,
        ..ConvertConfig::default()
    }
}

fn archive_names(path: &Path) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_full_conversion_with_command_exporter() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("finetuned_model");
    write_checkpoint(&model);

    let converter = ModelConverter::new(shell_exporter_config(), dir.path().to_path_buf());
    let request = ConvertRequest {
        checkpoint_dir: dir.path().join("checkpoints"),
        finetuned_model: model.clone(),
        output: dir.path().join("outputs").join("onnx_model"),
    };
    let result = converter.convert(&request).await.unwrap();

    assert_eq!(
        result.output_path,
        dir.path().join("outputs").join("onnx_model-onnx.zip")
    );
    assert_eq!(result.extracted_files, 2);
    assert_eq!(
        archive_names(&result.output_path),
        vec![
            "config.json",
            "decoder_model.onnx",
            "encoder_model.onnx",
            "task.txt"
        ]
    );
    assert!(result.compression_ratio < 0.1);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("checkpoints/onnx/task.txt"))
            .unwrap()
            .trim(),
        "text2text-generation-with-past"
    );
    assert!(!dir.path().join("checkpoints/workdir").exists());
}

#[tokio::test]
async fn test_custom_suffix_and_task() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.zip");
    write_checkpoint(&model);

    let config = ConvertConfig {
        archive_suffix: ".onnx.zip".to_string(),
        task: "text2text-generation".to_string(),
        keep_workdir: true,
        ..shell_exporter_config()
    };
    let converter = ModelConverter::new(config, dir.path().to_path_buf());
    let request = ConvertRequest {
        checkpoint_dir: dir.path().to_path_buf(),
        finetuned_model: model,
        output: dir.path().join("flan"),
    };
    let result = converter.convert(&request).await.unwrap();

    assert_eq!(result.output_path, dir.path().join("flan.onnx.zip"));
    assert!(dir.path().join("workdir/tokenizer/spiece.model").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("onnx/task.txt"))
            .unwrap()
            .trim(),
        "text2text-generation"
    );
}

#[tokio::test]
async fn test_exporter_failure_stops_before_packaging() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.zip");
    write_checkpoint(&model);

    let config = ConvertConfig {
        exporter_args: vec![
            "-c".to_string(),
            "echo 'ValueError: Unrecognized configuration class' >&2; exit 1".to_string(),
        ],
        ..shell_exporter_config()
    };
    let converter = ModelConverter::new(config, dir.path().to_path_buf());
    let request = ConvertRequest {
        checkpoint_dir: dir.path().to_path_buf(),
        finetuned_model: model,
        output: dir.path().join("out"),
    };
    let err = converter.convert(&request).await.unwrap_err();

    assert_eq!(err.stage(), Some(ConversionStage::Export));
    assert!(err.to_string().contains("Unrecognized configuration class"));
    assert!(!dir.path().join("out-onnx.zip").exists());
}

#[tokio::test]
async fn test_exporter_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.zip");
    write_checkpoint(&model);

    let config = ConvertConfig {
        exporter_args: vec!["-c".to_string(), "sleep 10".to_string()],
        timeout_secs: 1,
        ..shell_exporter_config()
    };
    let converter = ModelConverter::new(config, dir.path().to_path_buf());
    let request = ConvertRequest {
        checkpoint_dir: dir.path().to_path_buf(),
        finetuned_model: model,
        output: dir.path().join("out"),
    };
    let err = converter.convert(&request).await.unwrap_err();
    match err {
        ConvertError::Stage { stage, source } => {
            assert_eq!(stage, ConversionStage::Export);
            assert!(matches!(*source, ConvertError::Timeout(_)));
        }
        other => panic!("Expected staged timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_second_conversion_does_not_reuse_stale_export() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.zip");
    write_checkpoint(&model);
    let request = ConvertRequest {
        checkpoint_dir: dir.path().to_path_buf(),
        finetuned_model: model,
        output: dir.path().join("out"),
    };

    let first = ConvertConfig {
        exporter_args: vec![
            "-c".to_string(),
            "touch {output_dir}/old.onnx".to_string(),
        ],
        ..shell_exporter_config()
    };
    ModelConverter::new(first, dir.path().to_path_buf())
        .convert(&request)
        .await
        .unwrap();
    assert_eq!(archive_names(&dir.path().join("out-onnx.zip")), vec!["old.onnx"]);

    // An exporter that writes nothing must fail even though old.onnx existed.
    let second = ConvertConfig {
        exporter_args: vec!["-c".to_string(), "true".to_string()],
        ..shell_exporter_config()
    };
    let err = ModelConverter::new(second, dir.path().to_path_buf())
        .convert(&request)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(ConversionStage::Export));
    assert!(err.to_string().contains("no .onnx files"), "{err}");
    assert!(!dir.path().join("onnx").join("old.onnx").exists());
}

proptest! {
    #[test]
    fn suffix_is_appended_verbatim(stem in "[a-zA-Z0-9_.-]{1,20}", suffix in "[a-z.-]{1,12}") {
        let out = archive_output_path(Path::new(&stem), &suffix);
        prop_assert_eq!(out.to_string_lossy().into_owned(), format!("{stem}{suffix}"));
    }
}
