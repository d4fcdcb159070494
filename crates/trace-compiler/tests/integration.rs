use std::path::Path;

use trace_compiler::{compile_log, Options};

/// Compiles the log at `path` and returns the rendered program, or the error chain
fn run_compiler(path: &Path) -> String {
    match compile_log(path, &Options::default()) {
        Ok(output) => output,
        Err(err) => format!("Error: {:#}", err),
    }
}

#[test]
fn run_log_tests() {
    for entry in glob::glob("tests/inputs/*.log").expect("Invalid glob pattern") {
        let log_path = entry.expect("Failed to read file path");
        let output = run_compiler(&log_path);
        let filename = log_path.file_name().unwrap().to_string_lossy().to_string();

        insta::with_settings!({
            prepend_module_to_snapshot => false,
            snapshot_path => "snapshots",
        }, {
            insta::assert_snapshot!(filename, output);
        });
    }
}
