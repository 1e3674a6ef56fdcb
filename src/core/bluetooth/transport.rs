//! Transport seam between the session layer and the platform BLE stack
//!
//! The controller only ever talks to [`LampTransport`] and [`LampLink`].
//! [`BluestTransport`] is the production implementation on top of `bluest`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device, Uuid};
use futures_util::stream::{self, BoxStream, Stream};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::core::bluetooth::device::{address_from_platform_id, DeviceHandle};
use crate::core::bluetooth::types::Advertisement;

/// Advertisements for one scan; dropping the stream stops scanning
pub type AdvertisementStream = BoxStream<'static, Result<Advertisement>>;

/// Platform BLE access used by the controller
#[async_trait]
pub trait LampTransport: Send + Sync + 'static {
    /// Starts discovery. Fails when the radio refuses to scan.
    async fn scan(&self) -> Result<AdvertisementStream>;

    /// Opens a link to the device. `handle` is the token from the scan that
    /// found it, when there was one.
    async fn connect(&self, address: &str, handle: Option<&DeviceHandle>) -> Result<Arc<dyn LampLink>>;
}

/// An established link to one lamp
#[async_trait]
pub trait LampLink: Send + Sync {
    /// Resolves the lamp service and its write characteristic
    async fn discover_services(&self) -> Result<()>;

    /// Writes one frame to the command characteristic
    async fn write(&self, frame: &[u8]) -> Result<()>;

    /// Tears the link down
    async fn disconnect(&self) -> Result<()>;

    /// Resolves once the link is lost
    async fn closed(&self);
}

/// `bluest` backed transport
pub struct BluestTransport {
    adapter: Adapter,
    /// Devices seen while scanning, keyed by platform id
    devices: Arc<Mutex<HashMap<String, Device>>>,
    service_uuid: Uuid,
    write_char_uuid: Uuid,
}

impl BluestTransport {
    /// Opens the default adapter and waits for it to be powered on
    pub async fn new(service_uuid: Uuid, write_char_uuid: Uuid) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            service_uuid,
            write_char_uuid,
        })
    }

    async fn find_device(&self, address: &str, handle: Option<&DeviceHandle>) -> Result<Device> {
        if let Some(handle) = handle {
            if let Some(device) = self.devices.lock().await.get(handle.as_str()) {
                return Ok(device.clone());
            }
        }

        // Fall back to devices the system already holds a link to
        let connected = stream::iter(self.adapter.connected_devices().await?);
        if let Some(device) = find_by_address(connected, address, |d| d.id().to_string()).await {
            return Ok(device);
        }

        // Not seen in this session: scan until it advertises. The caller's
        // connect timeout bounds the search.
        info!("Device {} not cached, scanning for it...", address);
        let advertising = self.adapter.scan(&[]).await?.map(|discovered| discovered.device);
        let device = find_by_address(advertising, address, |d| d.id().to_string())
            .await
            .ok_or_else(|| anyhow!("Device not found with address: {}", address))?;
        self.devices
            .lock()
            .await
            .insert(device.id().to_string(), device.clone());
        Ok(device)
    }
}

/// First item of `items` whose platform id resolves to `address`
async fn find_by_address<S, T>(items: S, address: &str, platform_id: impl Fn(&T) -> String) -> Option<T>
where
    S: Stream<Item = T>,
{
    let mut items = Box::pin(items);
    while let Some(item) = items.next().await {
        if address_from_platform_id(&platform_id(&item)).as_deref() == Some(address) {
            return Some(item);
        }
    }
    None
}

#[async_trait]
impl LampTransport for BluestTransport {
    async fn scan(&self) -> Result<AdvertisementStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (started_tx, started_rx) = oneshot::channel();
        let adapter = self.adapter.clone();
        let devices = self.devices.clone();

        tokio::spawn(async move {
            let scan_stream = match adapter.scan(&[]).await {
                Ok(scan_stream) => {
                    let _ = started_tx.send(Ok(()));
                    scan_stream
                }
                Err(e) => {
                    let _ = started_tx.send(Err(anyhow!(e)));
                    return;
                }
            };
            let mut scan_stream = Box::pin(scan_stream);

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    result = scan_stream.next() => {
                        let Some(discovered) = result else {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        };
                        let device = discovered.device;
                        let id = device.id().to_string();
                        debug!("Found device - Device: {:?}, RSSI: {:?}", device, discovered.rssi);

                        let Some(address) = address_from_platform_id(&id) else {
                            debug!("Skipping device without usable address: {}", id);
                            continue;
                        };
                        let name = discovered
                            .adv_data
                            .local_name
                            .clone()
                            .or_else(|| device.name().ok());

                        devices.lock().await.insert(id.clone(), device);
                        let advertisement = Advertisement {
                            address,
                            name,
                            handle: DeviceHandle::new(id),
                        };
                        if tx.send(Ok(advertisement)).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Scan forwarding task finished.");
        });

        started_rx
            .await
            .map_err(|_| anyhow!("Scan task ended before starting"))??;

        let advertisements = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(advertisements.boxed())
    }

    async fn connect(&self, address: &str, handle: Option<&DeviceHandle>) -> Result<Arc<dyn LampLink>> {
        let device = self.find_device(address, handle).await?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Device details - Address: {}, Name: {:?}", address, name);

        if !device.is_connected().await {
            info!("Initiating connection to {}...", address);
            self.adapter.connect_device(&device).await?;
        }

        Ok(Arc::new(BluestLink {
            adapter: self.adapter.clone(),
            device,
            service_uuid: self.service_uuid,
            write_char_uuid: self.write_char_uuid,
            write_char: Mutex::new(None),
        }))
    }
}

/// A `bluest` link to one lamp
pub struct BluestLink {
    adapter: Adapter,
    device: Device,
    service_uuid: Uuid,
    write_char_uuid: Uuid,
    write_char: Mutex<Option<Characteristic>>,
}

#[async_trait]
impl LampLink for BluestLink {
    async fn discover_services(&self) -> Result<()> {
        info!("Connection successful, discovering services...");
        let services = self.device.discover_services_with_uuid(self.service_uuid).await?;
        let lamp_service = services
            .first()
            .ok_or_else(|| anyhow!("Lamp service not found: {}", self.service_uuid))?;
        info!("Found lamp service: {}", lamp_service.uuid());

        let characteristics = lamp_service
            .discover_characteristics_with_uuid(self.write_char_uuid)
            .await?;
        let write_char = characteristics
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Write characteristic not found: {}", self.write_char_uuid))?;
        info!("Found write characteristic: {}", write_char.uuid());

        *self.write_char.lock().await = Some(write_char);
        Ok(())
    }

    async fn write(&self, frame: &[u8]) -> Result<()> {
        let write_char = self
            .write_char
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("Write characteristic not resolved"))?;
        debug!("Writing frame {:02X?}", frame);
        write_char.write_without_response(frame).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.device.is_connected().await {
            info!("Disconnecting from device {}", self.device.id());
            self.adapter.disconnect_device(&self.device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", self.device.id());
        }
        Ok(())
    }

    async fn closed(&self) {
        match self.adapter.device_connection_events(&self.device).await {
            Ok(events) => {
                let mut events = Box::pin(events);
                while let Some(event) = events.next().await {
                    if matches!(event, bluest::ConnectionEvent::Disconnected) {
                        return;
                    }
                }
            }
            Err(e) => warn!("Connection events unavailable, polling instead: {}", e),
        }

        while self.device.is_connected().await {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_by_address_matches_platform_ids() {
        let ids = stream::iter(vec![
            "/org/bluez/hci0/dev_11_22_33_44_55_66",
            "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF",
            "/org/bluez/hci0/dev_aa_bb_cc_dd_ee_ff",
        ]);
        let found = find_by_address(ids, "AA:BB:CC:DD:EE:FF", |id| id.to_string()).await;
        assert_eq!(found, Some("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF"));
    }

    #[tokio::test]
    async fn test_find_by_address_gives_up_when_stream_ends() {
        let ids = stream::iter(vec!["/org/bluez/hci0/dev_11_22_33_44_55_66", "garbage"]);
        let found = find_by_address(ids, "AA:BB:CC:DD:EE:FF", |id| id.to_string()).await;
        assert_eq!(found, None);
    }
}
