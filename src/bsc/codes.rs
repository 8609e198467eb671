//! Transaction-code taxonomy and the fixed BSC error-code table.

/// A parsed six-byte `NN,NNN` header code, classified by what it means for
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionCode {
    /// `01,000` — command from the driving computer to the robot.
    Command,
    /// `02,0xx` — incoming file upload, carrying the upload id (xx).
    IncomingFile(u32),
    /// `02,0yy` (yy = xx + 50) — request for the same file, carrying the
    /// upload id it resolves to.
    FileRequest(u32),
    /// `90,000` — execution confirmation (`0000`) or a 4-digit error code.
    ExecResponse,
    /// `90,001` — CSV data response.
    DataResponse,
    /// Anything outside the known families.
    Unknown,
}

/// The `02,0xx` ids that name a real upload (per the transaction table).
const UPLOAD_IDS: &[u32] = &[1, 2, 11, 12, 13, 14, 15, 16, 17, 18, 20, 22, 23, 30];

fn parse_code(code: &[u8; 6]) -> Option<(u32, u32)> {
    let text = std::str::from_utf8(code).ok()?;
    let (category, id) = text.split_once(',')?;
    let category: u32 = category.parse().ok()?;
    let id: u32 = id.parse().ok()?;
    Some((category, id))
}

/// Classifies a raw six-byte header code.
pub fn classify(code: &[u8; 6]) -> TransactionCode {
    let Some((category, id)) = parse_code(code) else {
        return TransactionCode::Unknown;
    };

    match category {
        1 if id == 0 => TransactionCode::Command,
        2 if UPLOAD_IDS.contains(&id) => TransactionCode::IncomingFile(id),
        2 if id >= 51 && UPLOAD_IDS.contains(&(id - 50)) => TransactionCode::FileRequest(id - 50),
        90 if id == 0 => TransactionCode::ExecResponse,
        90 if id == 1 => TransactionCode::DataResponse,
        _ => TransactionCode::Unknown,
    }
}

/// Formats an upload id as the six-byte `02,0NN` header code.
pub fn incoming_file_code(id: u32) -> [u8; 6] {
    format_code(2, id)
}

/// Formats an upload id as its `02,0(NN+50)` request code.
pub fn file_request_code(id: u32) -> [u8; 6] {
    format_code(2, id + 50)
}

fn format_code(category: u32, id: u32) -> [u8; 6] {
    let text = format!("{category:02},{id:03}");
    let mut out = [0u8; 6];
    out.copy_from_slice(text.as_bytes());
    out
}

/// Fixed-name `.DAT` system tables, keyed by their upload id.
const SYSTEM_TABLE_NAMES: &[(u32, &str)] = &[
    (11, "WEAV.DAT"),
    (12, "TOOL.DAT"),
    (13, "UFRAME.DAT"),
    (14, "ABSWELD.DAT"),
    (15, "CV.DAT"),
    (16, "SENSOR.DAT"),
    (17, "COMARC2.DAT"),
    (18, "PC1PC2.DAT"),
    (20, "POSOUT.DAT"),
    (22, "RECIPRO.DAT"),
    (23, "PALACT.DAT"),
    (30, "SYSTEM.DAT"),
];

/// Reverse lookup from a filename to the upload id that carries it: `.JBI`
/// files are id 1, `.JBR` files are id 2, and the fixed system tables match
/// by exact name.
pub fn code_for_filename(filename: &str) -> Option<u32> {
    if filename.ends_with(".JBI") {
        return Some(1);
    }
    if filename.ends_with(".JBR") {
        return Some(2);
    }
    SYSTEM_TABLE_NAMES
        .iter()
        .find(|(_, name)| *name == filename)
        .map(|(id, _)| *id)
}

/// Looks up the human-readable meaning of a 4-digit BSC error code.
pub fn error_text(code: &str) -> Option<&'static str> {
    ERROR_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, text)| *text)
}

const ERROR_TABLE: &[(&str, &str)] = &[
    ("1010", "command failure"),
    ("1011", "command operand number failure"),
    ("1012", "command operand value excessive"),
    ("1013", "command operand length failure"),
    ("2010", "during robot operation"),
    ("2020", "during T-PENDANT"),
    ("2030", "during panel HOLD"),
    ("2040", "during external HOLD"),
    ("2050", "during command HOLD"),
    ("2060", "during error alarm"),
    ("2070", "in servo OFF or stopping by a panel HOLD"),
    ("3010", "servo power on"),
    ("3040", "set home position"),
    ("3070", "current position is not input"),
    ("3080", "END command of job (except master job)"),
    ("4010", "shortage of memory capacity (job registration)"),
    ("4012", "shortage of memory capacity (position data registration)"),
    ("4020", "job edit prohibit"),
    ("4030", "job of same name exists"),
    ("4040", "no desired job"),
    ("4060", "set execution"),
    ("4120", "position data broken"),
    ("4130", "no position data"),
    ("4150", "END command of job (except master job)"),
    ("4170", "instruction data broken"),
    ("4190", "unsuitable characters in job name exist"),
    ("4200", "unsuitable characters in job name exist"),
    ("4230", "instructions which cannot be used by this system exist"),
    ("5110", "instruction syntax error"),
    ("5120", "position data fault"),
    ("5130", "neither NOP or END exists"),
    ("5170", "format error"),
    ("5180", "data number is inadequate"),
    ("5200", "data range exceeded"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> [u8; 6] {
        let mut out = [0u8; 6];
        out.copy_from_slice(s.as_bytes());
        out
    }

    #[test]
    fn classifies_command() {
        assert_eq!(classify(&code("01,000")), TransactionCode::Command);
    }

    #[test]
    fn classifies_incoming_file() {
        assert_eq!(classify(&code("02,001")), TransactionCode::IncomingFile(1));
        assert_eq!(classify(&code("02,030")), TransactionCode::IncomingFile(30));
    }

    #[test]
    fn classifies_file_request_and_reverses() {
        assert_eq!(classify(&code("02,051")), TransactionCode::FileRequest(1));
        assert_eq!(file_request_code(1), code("02,051"));
        assert_eq!(incoming_file_code(1), code("02,001"));
    }

    #[test]
    fn classifies_exec_and_data_response() {
        assert_eq!(classify(&code("90,000")), TransactionCode::ExecResponse);
        assert_eq!(classify(&code("90,001")), TransactionCode::DataResponse);
    }

    #[test]
    fn unknown_code_falls_through() {
        assert_eq!(classify(&code("99,999")), TransactionCode::Unknown);
        assert_eq!(classify(&code("02,099")), TransactionCode::Unknown);
    }

    #[test]
    fn code_for_filename_resolves_extensions_and_system_tables() {
        assert_eq!(code_for_filename("JOB1.JBI"), Some(1));
        assert_eq!(code_for_filename("MASTER.JBR"), Some(2));
        assert_eq!(code_for_filename("TOOL.DAT"), Some(12));
        assert_eq!(code_for_filename("UNKNOWN.DAT"), None);
    }

    #[test]
    fn error_table_resolves_known_codes() {
        assert_eq!(error_text("4040"), Some("no desired job"));
        assert_eq!(error_text("9999"), None);
    }
}
