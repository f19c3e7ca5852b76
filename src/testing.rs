//! Test doubles: an in-memory fetcher, a recording notifier, and image builders.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;

use crate::notify::{ChatRef, MessageRef, Notifier, NotifyError};
use crate::scraper::{ByteStream, Fetcher, ScraperError};

enum Reply {
    Body(Vec<u8>),
    Status(u16),
    Hang,
}

/// Fetcher serving canned responses. Unknown URLs answer 404.
#[derive(Default)]
pub struct StubFetcher {
    routes: HashMap<String, Reply>,
    requests: Mutex<Vec<(String, HeaderMap)>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.bytes(url, html.as_bytes().to_vec())
    }

    pub fn bytes(mut self, url: &str, body: Vec<u8>) -> Self {
        self.routes.insert(url.to_string(), Reply::Body(body));
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.routes.insert(url.to_string(), Reply::Status(status));
        self
    }

    /// Requests to `url` never complete.
    pub fn hang(mut self, url: &str) -> Self {
        self.routes.insert(url.to_string(), Reply::Hang);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(u, _)| u.clone())
            .collect()
    }

    pub fn headers_for(&self, url: &str) -> Option<HeaderMap> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, h)| h.clone())
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<ByteStream, ScraperError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), headers.clone()));
        match self.routes.get(url) {
            Some(Reply::Body(body)) => {
                // Two chunks, so consumers really stream.
                let mid = body.len() / 2;
                let chunks = vec![
                    Ok(Bytes::copy_from_slice(&body[..mid])),
                    Ok(Bytes::copy_from_slice(&body[mid..])),
                ];
                Ok(Box::pin(futures::stream::iter(chunks)))
            }
            Some(Reply::Status(status)) => Err(ScraperError::HttpStatus {
                status: *status,
                url: url.to_string(),
            }),
            Some(Reply::Hang) => futures::future::pending().await,
            None => Err(ScraperError::HttpStatus {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct Message {
    id: u64,
    text: String,
    deleted: bool,
}

/// Notifier that keeps everything it is asked to do.
#[derive(Default)]
pub struct RecordingNotifier {
    next_id: AtomicU64,
    messages: Mutex<Vec<Message>>,
    log: Mutex<Vec<String>>,
    documents: Mutex<Vec<(String, Vec<u8>)>>,
    fail_status: bool,
    fail_documents: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every text operation fails; documents still go through.
    pub fn failing_status() -> Self {
        Self {
            fail_status: true,
            ..Self::default()
        }
    }

    /// Document delivery fails; text operations work.
    pub fn failing_documents() -> Self {
        Self {
            fail_documents: true,
            ..Self::default()
        }
    }

    /// Current text of every message that was not deleted.
    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| !m.deleted)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Every text ever sent or edited in, in order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Delivered documents: (file name, contents at delivery time).
    pub fn documents(&self) -> Vec<(String, Vec<u8>)> {
        self.documents.lock().unwrap().clone()
    }

    fn transport_error(&self) -> Result<(), NotifyError> {
        if self.fail_status {
            Err(NotifyError::Transport("status disabled".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, chat: &ChatRef, text: &str) -> Result<MessageRef, NotifyError> {
        self.transport_error()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().push(Message {
            id,
            text: text.to_string(),
            deleted: false,
        });
        self.log.lock().unwrap().push(text.to_string());
        Ok(MessageRef {
            chat: chat.clone(),
            id,
        })
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), NotifyError> {
        self.transport_error()?;
        let mut messages = self.messages.lock().unwrap();
        let m = messages
            .iter_mut()
            .find(|m| m.id == message.id && !m.deleted)
            .ok_or(NotifyError::UnknownMessage(message.id))?;
        m.text = text.to_string();
        self.log.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), NotifyError> {
        self.transport_error()?;
        let mut messages = self.messages.lock().unwrap();
        let m = messages
            .iter_mut()
            .find(|m| m.id == message.id && !m.deleted)
            .ok_or(NotifyError::UnknownMessage(message.id))?;
        m.deleted = true;
        Ok(())
    }

    async fn send_document(
        &self,
        _chat: &ChatRef,
        path: &Path,
        filename: &str,
    ) -> Result<(), NotifyError> {
        if self.fail_documents {
            return Err(NotifyError::Transport("upload rejected".into()));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| NotifyError::Delivery {
                path: path.to_path_buf(),
                source: e,
            })?;
        self.documents
            .lock()
            .unwrap()
            .push((filename.to_string(), bytes));
        Ok(())
    }
}

/// PNG-encoded solid image of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, image::ImageFormat::Png)
}

/// JPEG-encoded solid image of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, image::ImageFormat::Jpeg)
}

fn encode(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

/// Width and height of every page of a PDF, in page order.
pub fn pdf_page_sizes(bytes: &[u8]) -> Vec<(i64, i64)> {
    let doc = lopdf::Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_object(*id).unwrap().as_dict().unwrap();
            let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
            (media[2].as_i64().unwrap(), media[3].as_i64().unwrap())
        })
        .collect()
}
