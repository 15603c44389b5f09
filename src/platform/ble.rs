//! BLE observer on the Bluedroid GAP API.
//!
//! Bluedroid reports scan results through a C callback that cannot capture
//! state, so results are collected into a static buffer and handed to
//! [`BluedroidScanner`] when the scan completes.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Mutex;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_svc::sys::*;
use log::{error, info, warn};

use crate::decode::{Advertisement, BdAddr};
use crate::error::ScanError;
use crate::ports::BleScanner;
use crate::scan::ScanResults;

/// Upper bound on distinct advertisers kept per window.
const MAX_RESULTS: usize = 64;
const POLL_MS: u32 = 20;
/// Extra time allowed past the window for the completion event.
const COMPLETE_GRACE_MS: u32 = 1_000;

static RESULTS: Mutex<ScanResults> = Mutex::new(ScanResults::new(MAX_RESULTS));
static SCAN_DONE: AtomicBool = AtomicBool::new(false);
static PARAMS_SET: AtomicBool = AtomicBool::new(false);

unsafe extern "C" fn gap_event_handler(
    event: esp_gap_ble_cb_event_t,
    param: *mut esp_ble_gap_cb_param_t,
) {
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_PARAM_SET_COMPLETE_EVT => {
            PARAMS_SET.store(true, Ordering::Release);
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RESULT_EVT => {
            let rst = &(*param).scan_rst;
            match rst.search_evt {
                esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_RES_EVT => {
                    let scan_response = rst.ble_evt_type == esp_ble_evt_type_t_ESP_BLE_EVT_SCAN_RSP;
                    let len = rst.adv_data_len as usize + rst.scan_rsp_len as usize;
                    let data = &rst.ble_adv[..len.min(rst.ble_adv.len())];
                    if let Ok(mut results) = RESULTS.lock() {
                        results.record(BdAddr(rst.bda), data, scan_response);
                    }
                }
                esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_CMPL_EVT => {
                    SCAN_DONE.store(true, Ordering::Release);
                }
                _ => {}
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_START_COMPLETE_EVT => {
            let status = (*param).scan_start_cmpl.status;
            if status != esp_bt_status_t_ESP_BT_STATUS_SUCCESS {
                log::warn!("BLE GAP: scan start failed (status={})", status);
                SCAN_DONE.store(true, Ordering::Release);
            }
        }
        _ => {}
    }
}

/// [`BleScanner`] driving an active Bluedroid scan.
pub struct BluedroidScanner {
    _private: (),
}

impl BluedroidScanner {
    /// Bring up the controller and Bluedroid in BLE-only mode.
    pub fn start() -> anyhow::Result<Self> {
        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            esp!(esp_bt_controller_init(&mut bt_cfg))?;
            esp!(esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE))?;
            esp!(esp_bluedroid_init())?;
            esp!(esp_bluedroid_enable())?;
            esp!(esp_ble_gap_register_callback(Some(gap_event_handler)))?;

            let mut params = esp_ble_scan_params_t {
                scan_type: esp_ble_scan_type_t_BLE_SCAN_TYPE_ACTIVE,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                scan_filter_policy: esp_ble_scan_filter_t_BLE_SCAN_FILTER_ALLOW_ALL,
                // 100 ms interval, 99 ms window, in 0.625 ms units
                scan_interval: 160,
                scan_window: 158,
                scan_duplicate: esp_ble_scan_duplicate_t_BLE_SCAN_DUPLICATE_DISABLE,
            };
            esp!(esp_ble_gap_set_scan_params(&mut params))?;
        }

        let mut waited = 0;
        while !PARAMS_SET.load(Ordering::Acquire) && waited < COMPLETE_GRACE_MS {
            FreeRtos::delay_ms(POLL_MS);
            waited += POLL_MS;
        }
        info!("✅ BLE: observer ready");
        Ok(Self { _private: () })
    }
}

impl BleScanner for BluedroidScanner {
    fn scan(&mut self, window: Duration) -> Result<Vec<Advertisement>, ScanError> {
        SCAN_DONE.store(false, Ordering::Release);
        let secs = window.as_secs().max(1) as u32;

        let ret = unsafe { esp_ble_gap_start_scanning(secs) };
        if ret != ESP_OK as i32 {
            error!("BLE: start_scanning failed ({})", ret);
            return Err(ScanError::StartFailed);
        }

        let limit = secs * 1_000 + COMPLETE_GRACE_MS;
        let mut waited = 0;
        while !SCAN_DONE.load(Ordering::Acquire) {
            if waited >= limit {
                warn!("BLE: no completion event, stopping scan");
                unsafe {
                    esp_ble_gap_stop_scanning();
                }
                return Err(ScanError::Aborted);
            }
            FreeRtos::delay_ms(POLL_MS);
            waited += POLL_MS;
        }

        RESULTS
            .lock()
            .map(|results| results.advertisements().to_vec())
            .map_err(|_| ScanError::Aborted)
    }

    fn clear_results(&mut self) {
        if let Ok(mut results) = RESULTS.lock() {
            results.clear();
        }
    }
}
