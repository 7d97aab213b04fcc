//! Stack trace payloads exchanged with React Native clients.

use serde::{Deserialize, Serialize};

/// Raw frame as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactNativeStackFrame {
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub method_name: String,
}

/// Frame with a known file, the input of symbolication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputStackFrame {
    pub line_number: Option<u32>,
    pub column: Option<u32>,
    pub file: String,
    pub method_name: String,
}

impl TryFrom<ReactNativeStackFrame> for InputStackFrame {
    type Error = ReactNativeStackFrame;

    fn try_from(frame: ReactNativeStackFrame) -> Result<Self, Self::Error> {
        match frame.file {
            Some(file) if !file.is_empty() => Ok(Self {
                line_number: frame.line_number,
                column: frame.column,
                file,
                method_name: frame.method_name,
            }),
            _ => Err(frame),
        }
    }
}

/// Symbolicated frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(flatten)]
    pub frame: InputStackFrame,
    /// Hidden by default in the client's red box
    pub collapse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFrameLocation {
    pub row: u32,
    pub column: u32,
}

/// Excerpt of the original source around the failing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFrame {
    pub content: String,
    pub location: CodeFrameLocation,
    pub file_name: String,
}

/// Response of `POST /symbolicate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolicatorResults {
    pub code_frame: Option<CodeFrame>,
    pub stack: Vec<StackFrame>,
}

/// Body of `POST /symbolicate`.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolicateRequest {
    pub stack: Vec<ReactNativeStackFrame>,
}
