//! HTTP firmware update endpoint backed by `esp-ota`.
//!
//! `GET /update` serves an upload form. `POST /update` takes the image as
//! that form's multipart body or as a raw body, streams it into the
//! inactive OTA slot, marks it bootable and answers before the restart.
//! The restart itself is deferred to the next [`UpdateEndpoint::service`]
//! call so it happens between dispatcher steps rather than inside the HTTP
//! task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use esp_idf_svc::http::{Headers, Method};
use esp_idf_svc::io::{Read, Write};
use log::{info, warn};

use crate::error::UploadError;
use crate::ports::UpdateEndpoint;
use crate::update::UploadBody;

const CHUNK_LEN: usize = 1024;

const UPLOAD_FORM: &str = "<form method='POST' action='/update' enctype='multipart/form-data'>\
<input type='file' name='update'><input type='submit' value='Update'></form>";

pub struct HttpUpdateEndpoint {
    _server: EspHttpServer<'static>,
    restart_pending: Arc<AtomicBool>,
}

impl HttpUpdateEndpoint {
    pub fn start(hostname: &str) -> anyhow::Result<Self> {
        let mut server = EspHttpServer::new(&Configuration::default())?;
        let restart_pending = Arc::new(AtomicBool::new(false));

        let banner = format!(
            "{} {}\nPOST /update: multipart form field or raw image body\n",
            hostname,
            env!("CARGO_PKG_VERSION")
        );
        server.fn_handler("/", Method::Get, move |req| -> anyhow::Result<()> {
            req.into_ok_response()?.write_all(banner.as_bytes())?;
            Ok(())
        })?;

        server.fn_handler("/update", Method::Get, |req| -> anyhow::Result<()> {
            req.into_response(200, None, &[("Content-Type", "text/html")])?
                .write_all(UPLOAD_FORM.as_bytes())?;
            Ok(())
        })?;

        let flag = Arc::clone(&restart_pending);
        server.fn_handler("/update", Method::Post, move |mut req| -> anyhow::Result<()> {
            let mut body = UploadBody::for_content_type(req.content_type())?;
            info!("⬇️ OTA: upload started");
            let mut update =
                esp_ota::OtaUpdate::begin().map_err(|e| anyhow!("OTA begin: {:?}", e))?;

            let mut buf = [0u8; CHUNK_LEN];
            let mut sink = |bytes: &[u8]| {
                update.write(bytes).map_err(|e| {
                    warn!("OTA: write failed: {:?}", e);
                    UploadError::Write
                })
            };
            loop {
                let n = req.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                body.feed(&buf[..n], &mut sink)?;
            }
            let total = body.finish()?;

            let mut completed = update
                .finalize()
                .map_err(|e| anyhow!("OTA verify: {:?}", e))?;
            completed
                .set_as_boot_partition()
                .map_err(|e| anyhow!("OTA set boot: {:?}", e))?;

            info!("✅ OTA: {} bytes written, restart pending", total);
            req.into_ok_response()?.write_all(b"OK, restarting\n")?;
            flag.store(true, Ordering::Release);
            Ok(())
        })?;

        info!("✅ OTA: http://{}.local/update", hostname);
        Ok(Self {
            _server: server,
            restart_pending,
        })
    }
}

impl UpdateEndpoint for HttpUpdateEndpoint {
    fn service(&mut self) {
        if self.restart_pending.load(Ordering::Acquire) {
            info!("OTA: rebooting into new firmware");
            esp_ota::restart();
        }
    }
}

/// Confirm the running image so the bootloader does not roll it back.
pub fn mark_running_image_valid() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}
