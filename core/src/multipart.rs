//! `multipart/form-data` encoding for `RestTool::upload`.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        bytes: Vec<u8>,
    },
}

/// A form assembled in memory and encoded in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::with_boundary(format!("------------------------{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            filename: filename.into(),
            bytes,
        });
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match part {
                Part::Text { name, value } => {
                    out.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", escape(name))
                            .as_bytes(),
                    );
                    out.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    bytes,
                } => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                            escape(name),
                            escape(filename)
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                    out.extend_from_slice(bytes);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_text_and_file_parts() {
        let form = MultipartForm::with_boundary("XyZ")
            .text("note", "hello")
            .file("file", "a.bin", vec![0, 1, 2]);
        let mut expected = Vec::new();
        expected.extend_from_slice(b"--XyZ\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n");
        expected.extend_from_slice(
            b"--XyZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n",
        );
        expected.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        expected.extend_from_slice(&[0, 1, 2]);
        expected.extend_from_slice(b"\r\n--XyZ--\r\n");
        assert_eq!(form.encode(), expected);
        assert_eq!(form.content_type(), "multipart/form-data; boundary=XyZ");
    }

    #[test]
    fn generated_boundaries_differ() {
        assert_ne!(MultipartForm::new().boundary(), MultipartForm::new().boundary());
    }

    #[test]
    fn quotes_in_names_are_escaped() {
        let form = MultipartForm::with_boundary("b").text("a\"b", "v");
        let text = String::from_utf8(form.encode()).unwrap();
        assert!(text.contains("name=\"a\\\"b\""));
    }
}
