#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `#!/bin/sh` script standing in for the solver.
pub fn fake_solver(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Wall-force report with the solver's 19 header lines and the given totals.
pub fn report_text(totals: &[f64]) -> String {
    let mut text = String::new();
    for i in 0..19 {
        text.push_str(&format!("# report header {}\n", i));
    }
    text.push_str("zone pressure viscous Total\n");
    for (i, total) in totals.iter().enumerate() {
        text.push_str(&format!("wall-{} 0.0 0.0 {}\n", i, total));
    }
    text
}

/// Minimal force sheet carrying `marker` in A1.
pub fn write_master(path: &Path, marker: &str) {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.get_cell_mut("A1").set_value(marker);
    sheet.get_cell_mut("B11").set_value("Front wing");
    umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
}

/// Case folder with a single case file.
pub fn case_folder(root: &Path) -> PathBuf {
    let case = root.join("case");
    fs::create_dir_all(&case).unwrap();
    fs::write(case.join("car.cas.h5"), b"").unwrap();
    case
}
