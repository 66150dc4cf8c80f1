//! Excel automation through a long-lived PowerShell process.
//!
//! The session starts `powershell -Command -` and keeps `$global:xl` (the
//! `Excel.Application` COM object) and `$global:wb` (the open workbook) alive in
//! its global scope. Each request is a single line wrapped in `try/catch` that
//! answers with exactly one marker line:
//!
//! ```text
//! @@OK <id> <tab-separated values>
//! @@ERR <id> <exception message>
//! ```
//!
//! Any other output line is ignored, as is a marker carrying an older id (left
//! over from a request abandoned by a deadline).

use super::{AutomationHost, AutomationSession, HostError, PageSetup, WorkbookInfo, WorksheetInfo};
use crate::models::ExcelSettings;
use camino::Utf8Path;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

const PROG_ID: &str = "Excel.Application";
const OK_MARKER: &str = "@@OK";
const ERR_MARKER: &str = "@@ERR";
const FIELD_SEPARATOR: char = '\t';

/// How long a quitting session may take to exit before it is killed
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Launches Excel sessions hosted by a PowerShell process
#[derive(Debug, Clone)]
pub struct PowerShellHost {
    shell: String,
    response_pattern: Regex,
}

impl PowerShellHost {
    /// Create a host that runs the given PowerShell executable
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            response_pattern: Regex::new(r"^@@(OK|ERR) (\d+)(?: (.*))?$")
                .expect("Invalid response regex"),
        }
    }

    pub fn from_settings(settings: &ExcelSettings) -> Self {
        Self::new(settings.automation_shell.clone())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.shell);
        command
            .args([
                "-NoLogo",
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        command
    }
}

impl AutomationHost for PowerShellHost {
    type Session = PowerShellSession;

    async fn launch(&self) -> Result<PowerShellSession, HostError> {
        let mut child = self.command().spawn().map_err(HostError::Spawn)?;
        let stdin = child.stdin.take().ok_or(HostError::Closed)?;
        let stdout = child.stdout.take().ok_or(HostError::Closed)?;

        let mut session = PowerShellSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            response_pattern: self.response_pattern.clone(),
            next_id: 0,
            workbook_open: false,
        };

        session
            .eval(&format!(
                "[Console]::OutputEncoding = [Text.Encoding]::UTF8; \
                 $global:xl = New-Object -ComObject {}; 'ready'",
                PROG_ID
            ))
            .await?;

        tracing::debug!("Automation session started (pid {:?})", session.child.id());
        Ok(session)
    }
}

/// A PowerShell process holding one `Excel.Application` instance.
///
/// Dropping the session kills the PowerShell process.
pub struct PowerShellSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    response_pattern: Regex,
    next_id: u64,
    workbook_open: bool,
}

impl PowerShellSession {
    /// Run one request and wait for its marker line
    async fn eval(&mut self, body: &str) -> Result<String, HostError> {
        if body.contains(['\n', '\r']) {
            return Err(HostError::Protocol(format!("multi-line request: {}", body)));
        }
        if !body.is_ascii() {
            return Err(HostError::Protocol(format!("non-ASCII request: {}", body)));
        }

        self.next_id += 1;
        let id = self.next_id;
        tracing::trace!("Automation request {}: {}", id, body);

        self.stdin.write_all(request_line(id, body).as_bytes()).await?;
        self.stdin.flush().await?;

        loop {
            let line = self.stdout.next_line().await?.ok_or(HostError::Closed)?;

            match parse_response(&self.response_pattern, &line) {
                Some(response) if response.id == id => {
                    return if response.ok {
                        Ok(response.payload)
                    } else {
                        Err(HostError::Automation(response.payload))
                    };
                }
                Some(response) => {
                    tracing::debug!("Discarding stale automation response {}", response.id);
                }
                None => tracing::trace!("Automation output: {}", line),
            }
        }
    }

    async fn set_application_flag(&mut self, property: &str, value: bool) -> Result<(), HostError> {
        self.eval(&format!("$global:xl.{} = {}", property, ps_bool(value)))
            .await
            .map(|_| ())
    }

    fn require_workbook(&self) -> Result<(), HostError> {
        if self.workbook_open {
            Ok(())
        } else {
            Err(HostError::NoWorkbook)
        }
    }
}

impl AutomationSession for PowerShellSession {
    async fn set_visible(&mut self, visible: bool) -> Result<(), HostError> {
        self.set_application_flag("Visible", visible).await
    }

    async fn set_display_alerts(&mut self, enabled: bool) -> Result<(), HostError> {
        self.set_application_flag("DisplayAlerts", enabled).await
    }

    async fn set_screen_updating(&mut self, enabled: bool) -> Result<(), HostError> {
        self.set_application_flag("ScreenUpdating", enabled).await
    }

    async fn centimeters_to_points(&mut self, centimeters: f64) -> Result<f64, HostError> {
        let payload = self
            .eval(&format!(
                "$global:xl.CentimetersToPoints({}).ToString([Globalization.CultureInfo]::InvariantCulture)",
                ps_number(centimeters)
            ))
            .await?;

        payload
            .trim()
            .parse()
            .map_err(|_| HostError::Protocol(payload.clone()))
    }

    async fn open_workbook(&mut self, path: &Utf8Path) -> Result<WorkbookInfo, HostError> {
        let payload = self
            .eval(&format!(
                "$global:wb = $global:xl.Workbooks.Open({}); $global:wb.Name; $global:wb.Worksheets.Count",
                ps_string(path.as_str())
            ))
            .await?;

        self.workbook_open = true;
        match parse_workbook(&payload) {
            Ok(info) => Ok(info),
            Err(e) => {
                if let Err(close_error) = self.close_workbook().await {
                    tracing::warn!("Failed to close unparsed workbook: {}", close_error);
                }
                Err(e)
            }
        }
    }

    async fn worksheet(&mut self, index: usize) -> Result<WorksheetInfo, HostError> {
        self.require_workbook()?;

        let payload = self
            .eval(&format!(
                "$ws = $global:wb.Worksheets.Item({}); $u = $ws.UsedRange; \
                 $ws.Name; $u.Rows.Count; $u.Columns.Count; $u.Address($true, $true); \
                 [string]$ws.PageSetup.PrintArea",
                index + 1
            ))
            .await?;

        parse_worksheet(&payload)
    }

    async fn apply_page_setup(&mut self, index: usize, setup: &PageSetup) -> Result<(), HostError> {
        self.require_workbook()?;
        self.eval(&page_setup_body(index, setup)).await.map(|_| ())
    }

    async fn export_pdf(&mut self, path: &Utf8Path) -> Result<(), HostError> {
        self.require_workbook()?;

        // xlTypePDF = 0
        self.eval(&format!(
            "$global:wb.ExportAsFixedFormat(0, {})",
            ps_string(path.as_str())
        ))
        .await
        .map(|_| ())
    }

    async fn close_workbook(&mut self) -> Result<(), HostError> {
        if !self.workbook_open {
            return Ok(());
        }

        self.workbook_open = false;
        self.eval("if ($global:wb) { $global:wb.Close($false); $global:wb = $null }")
            .await
            .map(|_| ())
    }

    async fn quit(mut self) -> Result<(), HostError> {
        let result = self
            .eval(
                "$global:xl.Quit(); \
                 [void][Runtime.InteropServices.Marshal]::ReleaseComObject($global:xl); \
                 $global:xl = $null",
            )
            .await
            .map(|_| ());

        // Ask the shell itself to exit, then make sure it did
        if let Err(e) = self.stdin.write_all(b"exit\n").await {
            tracing::debug!("Automation shell stdin already closed: {}", e);
        }
        drop(self.stdin);

        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("Automation shell exited with {}", status),
            Ok(Err(e)) => tracing::warn!("Failed to wait for automation shell: {}", e),
            Err(_) => {
                tracing::warn!("Automation shell did not exit within {:?}, killing it", EXIT_GRACE);
                if let Err(e) = self.child.kill().await {
                    tracing::warn!("Failed to kill automation shell: {}", e);
                }
            }
        }

        result
    }
}

/// Parsed marker line
#[derive(Debug, PartialEq)]
struct Response {
    id: u64,
    ok: bool,
    payload: String,
}

fn request_line(id: u64, body: &str) -> String {
    format!(
        "try {{ $r = & {{ {body} }}; [Console]::Out.WriteLine('{ok} {id} ' + (@($r) -join \"`t\")) }} \
         catch {{ [Console]::Out.WriteLine('{err} {id} ' + ($_.Exception.Message -replace '\\s+', ' ')) }}; \
         [Console]::Out.Flush()\n",
        body = body,
        ok = OK_MARKER,
        err = ERR_MARKER,
        id = id,
    )
}

fn parse_response(pattern: &Regex, line: &str) -> Option<Response> {
    let captures = pattern.captures(line)?;
    let id = captures.get(2)?.as_str().parse().ok()?;

    Some(Response {
        id,
        ok: &captures[1] == "OK",
        payload: captures
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
    })
}

fn parse_workbook(payload: &str) -> Result<WorkbookInfo, HostError> {
    let (name, count) = payload
        .rsplit_once(FIELD_SEPARATOR)
        .ok_or_else(|| HostError::Protocol(payload.to_string()))?;

    Ok(WorkbookInfo {
        name: name.to_string(),
        sheet_count: count
            .trim()
            .parse()
            .map_err(|_| HostError::Protocol(payload.to_string()))?,
    })
}

fn parse_worksheet(payload: &str) -> Result<WorksheetInfo, HostError> {
    let protocol_error = || HostError::Protocol(payload.to_string());

    // The sheet name comes first and is the only field that may contain anything
    let mut fields = payload.rsplitn(5, FIELD_SEPARATOR);
    let print_area = fields.next().ok_or_else(protocol_error)?;
    let used_address = fields.next().ok_or_else(protocol_error)?;
    let used_columns = fields.next().ok_or_else(protocol_error)?;
    let used_rows = fields.next().ok_or_else(protocol_error)?;
    let name = fields.next().ok_or_else(protocol_error)?;

    Ok(WorksheetInfo {
        name: name.to_string(),
        used_rows: used_rows.trim().parse().map_err(|_| protocol_error())?,
        used_columns: used_columns.trim().parse().map_err(|_| protocol_error())?,
        used_address: used_address.to_string(),
        print_area: print_area.to_string(),
    })
}

fn page_setup_body(index: usize, setup: &PageSetup) -> String {
    let fit = |pages: Option<u32>| match pages {
        Some(n) => n.to_string(),
        None => ps_bool(false).to_string(),
    };
    let m = &setup.margins;

    let mut body = format!(
        "$ps = $global:wb.Worksheets.Item({}).PageSetup; \
         $ps.Orientation = {}; $ps.Zoom = $false; \
         $ps.FitToPagesWide = {}; $ps.FitToPagesTall = {}; \
         $ps.LeftMargin = {}; $ps.RightMargin = {}; $ps.TopMargin = {}; $ps.BottomMargin = {}; \
         $ps.HeaderMargin = {}; $ps.FooterMargin = {}; \
         $ps.CenterHorizontally = {}; $ps.CenterVertically = {}; \
         $ps.PrintQuality = {}",
        index + 1,
        setup.orientation.code(),
        fit(setup.fit_to_pages_wide),
        fit(setup.fit_to_pages_tall),
        ps_number(m.left),
        ps_number(m.right),
        ps_number(m.top),
        ps_number(m.bottom),
        ps_number(m.header),
        ps_number(m.footer),
        ps_bool(setup.center_horizontally),
        ps_bool(setup.center_vertically),
        setup.print_quality,
    );

    if let Some(area) = &setup.print_area {
        body.push_str(&format!("; $ps.PrintArea = {}", ps_string(area)));
    }

    body
}

fn ps_bool(value: bool) -> &'static str {
    if value { "$true" } else { "$false" }
}

fn ps_number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        "0".to_string()
    }
}

/// PowerShell string expression using only ASCII.
///
/// `-Command -` decodes stdin with the console code page, so characters outside
/// ASCII are spelled as `[char]0xXXXX` (one per UTF-16 unit) and concatenated
/// onto single-quoted literals. The expression always starts with a literal so
/// `+` concatenates instead of adding char codes.
fn ps_string(value: &str) -> String {
    if value.is_ascii() {
        return quote_ascii(value);
    }

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut units = [0u16; 2];
    for ch in value.chars() {
        if ch.is_ascii() {
            literal.push(ch);
            continue;
        }
        if !literal.is_empty() || parts.is_empty() {
            parts.push(quote_ascii(&literal));
            literal.clear();
        }
        for unit in ch.encode_utf16(&mut units) {
            parts.push(format!("[char]0x{:04X}", unit));
        }
    }
    if !literal.is_empty() {
        parts.push(quote_ascii(&literal));
    }

    format!("({})", parts.join(" + "))
}

fn quote_ascii(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
