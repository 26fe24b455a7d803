use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageReader;
use thiserror::Error;

use crate::models::UploadedFile;

#[derive(Clone, Debug, PartialEq)]
pub enum ContentItem {
  Text(String),
  Image { data: Vec<u8>, mime: &'static str },
}

#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("declared type {0:?} is not an image")]
  NotAnImage(String),
  #[error("preview is not a data URL")]
  NotADataUrl,
  #[error("invalid base64 payload: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("not a decodable image: {0}")]
  Image(#[from] image::ImageError),
}

pub struct SkippedFile {
  pub label: String,
  pub reason: DecodeError,
}

pub struct NormalizedContent {
  pub items: Vec<ContentItem>,
  pub skipped: Vec<SkippedFile>,
}

pub fn normalize(text: &str, files: &[UploadedFile]) -> NormalizedContent {
  let mut items = Vec::new();
  let mut skipped = Vec::new();
  if !text.trim().is_empty() {
    items.push(ContentItem::Text(text.to_string()));
  }
  for (index, file) in files.iter().enumerate() {
    match decode_file(file) {
      Ok(item) => items.push(item),
      Err(reason) => skipped.push(SkippedFile {
        label: file
          .name
          .clone()
          .unwrap_or_else(|| format!("file #{}", index + 1)),
        reason,
      }),
    }
  }
  NormalizedContent { items, skipped }
}

fn decode_file(file: &UploadedFile) -> Result<ContentItem, DecodeError> {
  if let Some(declared) = &file.r#type {
    if !declared.starts_with("image") {
      return Err(DecodeError::NotAnImage(declared.clone()));
    }
  }
  let payload = file
    .preview
    .split_once(',')
    .map(|(_, payload)| payload)
    .ok_or(DecodeError::NotADataUrl)?;
  let data = STANDARD.decode(payload.trim())?;
  // The declared mime is advisory; the sniffed format decides what we forward.
  let format = image::guess_format(&data)?;
  ImageReader::with_format(Cursor::new(&data), format).into_dimensions()?;
  Ok(ContentItem::Image {
    data,
    mime: format.to_mime_type(),
  })
}
