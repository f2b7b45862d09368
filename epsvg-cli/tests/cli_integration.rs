use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct TestDir {
    path: PathBuf,
}

impl TestDir {
    fn new(tag: &str) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let path =
            std::env::temp_dir().join(format!("epsvg_cli_{tag}_{}_{}", std::process::id(), ts));
        fs::create_dir_all(&path).expect("create temp test dir");
        Self { path }
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_epsvg(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_epsvg"))
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("run epsvg")
}

const TRIANGLE: &str =
    "%!PS-Adobe-3.0 EPSF-3.0\nnewpath 10 10 moveto 20 10 lineto 20 20 lineto closepath fill\n";

#[test]
fn converts_a_document_to_svg() {
    let dir = TestDir::new("triangle");
    fs::write(dir.path.join("sample.eps"), TRIANGLE).expect("write sample eps");

    let output = run_epsvg(&["sample.eps", "-o", "triangle.svg"], &dir.path);
    assert!(output.status.success(), "process failed: {output:?}");

    let svg_path = dir.path.join("triangle.svg");
    assert!(svg_path.is_file(), "expected output file at {svg_path:?}");
    let svg = fs::read_to_string(svg_path).expect("read svg output");
    assert!(svg.contains("<svg"), "expected svg root element: {svg}");
    assert!(
        svg.contains("M 10 10L 20 10L 20 20z"),
        "expected triangle path data: {svg}"
    );
}

#[test]
fn default_paths_are_input_eps_and_out_svg() {
    let dir = TestDir::new("defaults");
    fs::write(dir.path.join("input.eps"), TRIANGLE).expect("write input eps");

    let output = run_epsvg(&[], &dir.path);
    assert!(output.status.success(), "process failed: {output:?}");
    assert!(dir.path.join("out.svg").is_file(), "expected out.svg");
}

#[test]
fn interpreter_error_exits_nonzero_without_output() {
    let dir = TestDir::new("error");
    fs::write(dir.path.join("bad.eps"), "1 2 qux\n").expect("write bad eps");

    let output = run_epsvg(&["bad.eps", "-o", "bad.svg"], &dir.path);
    assert!(!output.status.success(), "expected failure: {output:?}");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("'qux' is not defined"),
        "expected diagnostic in stderr, got: {stderr}"
    );
    assert!(
        !dir.path.join("bad.svg").exists(),
        "no output file should be written on error"
    );
}

#[test]
fn missing_input_is_an_error() {
    let dir = TestDir::new("missing");
    let output = run_epsvg(&["nosuch.eps"], &dir.path);
    assert!(!output.status.success(), "expected failure: {output:?}");
}
