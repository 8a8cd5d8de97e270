//! Multipart upload parsing.

use super::ApiError;
use axum::extract::Multipart;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use std::str::FromStr;
use tracing::debug;

/// Fields of an upload form.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub file: Option<Vec<u8>>,
    /// 1-based PDF page.
    pub page: Option<usize>,
    pub dpi: Option<u32>,
    /// Every `langs` field, split on commas.
    pub langs: Vec<String>,
}

fn field_error(e: MultipartError) -> ApiError {
    ApiError::new(e.status(), e.body_text())
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::unprocessable(format!("field '{name}' must be a positive integer, got '{value}'")))
}

impl UploadForm {
    pub async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self, ApiError> {
        let mut multipart = multipart.map_err(|e| ApiError::unprocessable(e.body_text()))?;
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(field_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => form.file = Some(field.bytes().await.map_err(field_error)?.to_vec()),
                "page" => form.page = Some(parse_number("page", &field.text().await.map_err(field_error)?)?),
                "dpi" => form.dpi = Some(parse_number("dpi", &field.text().await.map_err(field_error)?)?),
                "langs" => {
                    let value = field.text().await.map_err(field_error)?;
                    form.langs.extend(split_langs(&value));
                }
                other => debug!("Ignoring form field '{}'", other),
            }
        }
        Ok(form)
    }

    /// Moves the uploaded bytes out of the form.
    pub fn take_file(&mut self) -> Result<Vec<u8>, ApiError> {
        match self.file.take() {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            Some(_) => Err(ApiError::bad_request("uploaded file is empty")),
            None => Err(ApiError::missing_field("file")),
        }
    }
}

fn split_langs(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_langs_split_on_commas() {
        let langs: Vec<String> = split_langs(" en, German ,,ja").collect();
        assert_eq!(langs, vec!["en", "German", "ja"]);
    }

    #[test]
    fn test_bad_number_is_422() {
        let err = parse_number::<usize>("page", "two").unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(parse_number::<u32>("dpi", " 150 ").unwrap(), 150);
    }

    #[test]
    fn test_take_file() {
        let mut form = UploadForm::default();
        assert_eq!(form.take_file().unwrap_err().status, StatusCode::UNPROCESSABLE_ENTITY);
        form.file = Some(Vec::new());
        assert_eq!(form.take_file().unwrap_err().status, StatusCode::BAD_REQUEST);
        form.file = Some(vec![1, 2, 3]);
        assert_eq!(form.take_file().unwrap(), vec![1, 2, 3]);
    }
}
