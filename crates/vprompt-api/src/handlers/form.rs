//! Multipart form collection.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::Multipart;

use crate::error::{ApiError, ApiResult};

/// A file part of a multipart body.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub data: Bytes,
}

/// All parts of a multipart body, split into text fields and files.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read multipart field: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let data = field.bytes().await.map_err(|e| {
                        ApiError::bad_request(format!("Failed to read file {}: {}", name, e))
                    })?;
                    form.files.insert(
                        name,
                        UploadedFile {
                            filename: Some(filename),
                            data,
                        },
                    );
                }
                None => {
                    let text = field.text().await.map_err(|e| {
                        ApiError::bad_request(format!("Failed to read field {}: {}", name, e))
                    })?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    /// Non-blank text value of a field.
    ///
    /// A file part with that name is accepted too when it is valid UTF-8
    /// (clients sometimes upload JSON documents as files).
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .or_else(|| {
                self.files
                    .get(name)
                    .and_then(|f| std::str::from_utf8(&f.data).ok())
            })
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Remove and return a file part.
    ///
    /// A plain field with that name is returned as a file without a name.
    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name).or_else(|| {
            self.fields.remove(name).map(|text| UploadedFile {
                filename: None,
                data: Bytes::from(text),
            })
        })
    }
}
