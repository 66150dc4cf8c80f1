//! Shared fixtures: a scripted automation host and a fake host system.
//!
//! The fake host records every call into a shared [`HostState`] so tests can
//! inspect what the converter did after handing the host over.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use excel2pdf_rpa::Settings;
use excel2pdf_rpa::host::{
    AutomationHost, AutomationSession, HostError, PageSetup, WorkbookInfo, WorksheetInfo,
};
use excel2pdf_rpa::services::{HostSystem, ProcessEntry, SystemError};
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

pub const POINTS_PER_CM: f64 = 72.0 / 2.54;

/// Behaviour of the fake host
#[derive(Debug, Clone)]
pub struct HostScript {
    /// Whether the application can be started at all
    pub reachable: bool,
    /// Sheets every opened workbook reports
    pub sheets: Vec<WorksheetInfo>,
    /// Number of initial open attempts that fail
    pub fail_open_times: usize,
    /// File names that can never be opened
    pub broken_files: Vec<String>,
    /// Whether export actually writes the PDF
    pub write_output: bool,
    pub fail_export: bool,
    /// Export never completes
    pub hang_on_export: bool,
    /// Workbooks open in the application but their details come back unreadable
    pub garbled_open: bool,
}

impl Default for HostScript {
    fn default() -> Self {
        Self {
            reachable: true,
            sheets: vec![sheet("Hoja1", 20, 4)],
            fail_open_times: 0,
            broken_files: Vec::new(),
            write_output: true,
            fail_export: false,
            hang_on_export: false,
            garbled_open: false,
        }
    }
}

/// Everything the fake host observed
#[derive(Debug, Default)]
pub struct HostState {
    pub launches: usize,
    pub quits: usize,
    pub open_attempts: usize,
    pub opened: Vec<Utf8PathBuf>,
    pub closed_workbooks: usize,
    /// Workbooks replaced by another open before being closed
    pub leaked_workbooks: usize,
    pub page_setups: Vec<(usize, PageSetup)>,
    pub exports: Vec<Utf8PathBuf>,
    pub screen_updating: Option<bool>,
}

pub struct FakeHost {
    script: HostScript,
    state: Rc<RefCell<HostState>>,
}

impl FakeHost {
    pub fn new(script: HostScript) -> (Self, Rc<RefCell<HostState>>) {
        let state = Rc::new(RefCell::new(HostState::default()));
        let host = Self {
            script,
            state: Rc::clone(&state),
        };
        (host, state)
    }
}

impl AutomationHost for FakeHost {
    type Session = FakeSession;

    async fn launch(&self) -> Result<FakeSession, HostError> {
        if !self.script.reachable {
            return Err(HostError::Automation("Excel.Application is not registered".into()));
        }

        self.state.borrow_mut().launches += 1;
        Ok(FakeSession {
            script: self.script.clone(),
            state: Rc::clone(&self.state),
            open: None,
        })
    }

    async fn probe(&self) -> bool {
        self.script.reachable
    }
}

pub struct FakeSession {
    script: HostScript,
    state: Rc<RefCell<HostState>>,
    open: Option<Utf8PathBuf>,
}

impl AutomationSession for FakeSession {
    async fn set_visible(&mut self, _visible: bool) -> Result<(), HostError> {
        Ok(())
    }

    async fn set_display_alerts(&mut self, _enabled: bool) -> Result<(), HostError> {
        Ok(())
    }

    async fn set_screen_updating(&mut self, enabled: bool) -> Result<(), HostError> {
        self.state.borrow_mut().screen_updating = Some(enabled);
        Ok(())
    }

    async fn centimeters_to_points(&mut self, centimeters: f64) -> Result<f64, HostError> {
        Ok(centimeters * POINTS_PER_CM)
    }

    async fn open_workbook(&mut self, path: &Utf8Path) -> Result<WorkbookInfo, HostError> {
        let mut state = self.state.borrow_mut();
        state.open_attempts += 1;

        let name = path.file_name().unwrap_or_default().to_string();
        if self.script.broken_files.contains(&name) {
            return Err(HostError::Automation(format!("'{}' is corrupt", name)));
        }
        if state.open_attempts <= self.script.fail_open_times {
            return Err(HostError::Automation("The file is locked for editing".into()));
        }

        state.opened.push(path.to_path_buf());
        if self.open.replace(path.to_path_buf()).is_some() {
            state.leaked_workbooks += 1;
        }
        if self.script.garbled_open {
            return Err(HostError::Protocol("?\t?".into()));
        }
        Ok(WorkbookInfo {
            name,
            sheet_count: self.script.sheets.len(),
        })
    }

    async fn worksheet(&mut self, index: usize) -> Result<WorksheetInfo, HostError> {
        self.script
            .sheets
            .get(index)
            .cloned()
            .ok_or_else(|| HostError::Automation(format!("No sheet at index {}", index)))
    }

    async fn apply_page_setup(&mut self, index: usize, setup: &PageSetup) -> Result<(), HostError> {
        self.state
            .borrow_mut()
            .page_setups
            .push((index, setup.clone()));
        Ok(())
    }

    async fn export_pdf(&mut self, path: &Utf8Path) -> Result<(), HostError> {
        if self.open.is_none() {
            return Err(HostError::NoWorkbook);
        }
        if self.script.hang_on_export {
            std::future::pending::<()>().await;
        }
        if self.script.fail_export {
            return Err(HostError::Automation("Document not saved".into()));
        }

        self.state.borrow_mut().exports.push(path.to_path_buf());
        if self.script.write_output {
            fs::write(path, b"%PDF-1.7 fake")?;
        }
        Ok(())
    }

    async fn close_workbook(&mut self) -> Result<(), HostError> {
        if self.open.take().is_none() {
            return Ok(());
        }
        self.state.borrow_mut().closed_workbooks += 1;
        Ok(())
    }

    async fn quit(self) -> Result<(), HostError> {
        self.state.borrow_mut().quits += 1;
        Ok(())
    }
}

/// Host system with a fixed process table and free space
#[derive(Debug, Clone)]
pub struct FakeSystem {
    pub processes: Vec<ProcessEntry>,
    pub available: Option<u64>,
    pub terminated: Rc<RefCell<Vec<u32>>>,
}

impl Default for FakeSystem {
    fn default() -> Self {
        Self {
            processes: Vec::new(),
            available: Some(u64::MAX),
            terminated: Rc::default(),
        }
    }
}

impl HostSystem for FakeSystem {
    fn processes(&mut self) -> Vec<ProcessEntry> {
        self.processes.clone()
    }

    fn terminate(&mut self, pid: u32) -> Result<(), SystemError> {
        self.terminated.borrow_mut().push(pid);
        Ok(())
    }

    fn available_space(&mut self, _path: &Utf8Path) -> Option<u64> {
        self.available
    }
}

pub fn sheet(name: &str, rows: u32, columns: u32) -> WorksheetInfo {
    WorksheetInfo {
        name: name.to_string(),
        used_rows: rows,
        used_columns: columns,
        used_address: format!("$A$1:$D${}", rows),
        print_area: String::new(),
    }
}

/// Settings without retry delays or process cleanup
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.excel.timeout_seconds = 5;
    settings.excel.retry_delay = 0.0;
    settings.cleanup.kill_orphaned_excel = false;
    settings
}

pub fn temp_path() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, path)
}

/// Write a placeholder workbook
pub fn write_workbook(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"PK\x03\x04 workbook").unwrap();
    path
}
