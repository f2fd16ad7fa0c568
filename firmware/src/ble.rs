// Plank Board — BLE Beacon
//
// GATT server with one primary service and three read+notify
// characteristics (capacitive, strain, piezo), each with a CCCD so clients
// opt in per stream. The Bluedroid attribute table is built event-driven:
// register app -> create service -> add characteristic -> add its CCCD ->
// next characteristic, then advertise under the original service UUID.

use std::sync::{Arc, Mutex};

use esp_idf_svc::bt::ble::gap::{AdvConfiguration, BleGapEvent, EspBleGap};
use esp_idf_svc::bt::ble::gatt::server::{ConnectionId, EspGatts, GattsEvent};
use esp_idf_svc::bt::ble::gatt::{
    AutoResponse, GattCharacteristic, GattDescriptor, GattId, GattInterface, GattServiceId,
    GattStatus, Handle, Permission, Property,
};
use esp_idf_svc::bt::{BdAddr, Ble, BtDriver, BtStatus, BtUuid};
use esp_idf_svc::sys::{EspError, ESP_FAIL};

use crate::config::*;

type Driver = BtDriver<'static, Ble>;
type Gap = EspBleGap<'static, Ble, Arc<Driver>>;
type Gatts = EspGatts<'static, Ble, Arc<Driver>>;

const APP_ID: u16 = 0;
const MAX_CONNECTIONS: usize = 4;
// One service declaration plus, per characteristic, a declaration, a value
// and a CCCD attribute.
const GATT_HANDLE_COUNT: u16 = 1 + 3 * 3 + 2;
const CCCD_UUID: u16 = 0x2902;

/// The three notify streams, in attribute-table order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stream {
    Capacitive = 0,
    Strain = 1,
    Piezo = 2,
}

const STREAMS: [Stream; 3] = [Stream::Capacitive, Stream::Strain, Stream::Piezo];

impl Stream {
    fn uuid(self) -> BtUuid {
        match self {
            Self::Capacitive => BtUuid::uuid128(CAPACITIVE_CHAR_UUID),
            Self::Strain => BtUuid::uuid128(STRAIN_CHAR_UUID),
            Self::Piezo => BtUuid::uuid128(PIEZO_CHAR_UUID),
        }
    }

    fn max_len(self) -> usize {
        match self {
            Self::Capacitive => crate::packets::CAPACITIVE_PACKET_SIZE,
            Self::Strain => crate::packets::STRAIN_PACKET_SIZE,
            Self::Piezo => crate::packets::PIEZO_PACKET_SIZE,
        }
    }
}

struct Connection {
    peer: BdAddr,
    conn_id: ConnectionId,
    subscribed: [bool; 3],
}

#[derive(Default)]
struct State {
    gatt_if: Option<GattInterface>,
    char_handles: [Option<Handle>; 3],
    cccd_handles: [Option<Handle>; 3],
    /// Characteristics added to the table so far; drives the add sequence.
    added: usize,
    connections: heapless::Vec<Connection, MAX_CONNECTIONS>,
}

pub struct BleServer {
    gap: Arc<Gap>,
    gatts: Arc<Gatts>,
    state: Mutex<State>,
}

impl BleServer {
    /// Bring up GAP and GATTS on the given Bluetooth driver, register the
    /// sensor service and start advertising.
    pub fn start(driver: Arc<Driver>) -> anyhow::Result<Arc<Self>> {
        let server = Arc::new(Self {
            gap: Arc::new(EspBleGap::new(driver.clone())?),
            gatts: Arc::new(EspGatts::new(driver)?),
            state: Mutex::new(State::default()),
        });

        let gap_server = server.clone();
        server.gap.subscribe(move |event| {
            if let Err(e) = gap_server.on_gap_event(event) {
                log::warn!("BLE GAP event error: {}", e);
            }
        })?;

        let gatts_server = server.clone();
        server.gatts.subscribe(move |(gatt_if, event)| {
            if let Err(e) = gatts_server.on_gatts_event(gatt_if, event) {
                log::warn!("BLE GATTS event error: {}", e);
            }
        })?;

        server.gap.set_device_name(BLE_DEVICE_NAME)?;
        server.gap.set_adv_conf(&AdvConfiguration {
            include_name: true,
            include_txpower: true,
            flag: 2,
            service_uuid: Some(BtUuid::uuid128(SENSOR_SERVICE_UUID)),
            ..Default::default()
        })?;
        server.gatts.register_app(APP_ID)?;

        Ok(server)
    }

    /// True while at least one client is connected; used by the
    /// acquisition task to decide when the scale bank may stand by.
    pub fn has_subscriber(&self) -> bool {
        !self.state.lock().unwrap().connections.is_empty()
    }

    pub fn notify_capacitive(&self, payload: &[u8]) {
        self.notify(Stream::Capacitive, payload);
    }

    pub fn notify_strain(&self, payload: &[u8]) {
        self.notify(Stream::Strain, payload);
    }

    pub fn notify_piezo(&self, payload: &[u8]) {
        self.notify(Stream::Piezo, payload);
    }

    /// Push a payload to every connection subscribed to the stream.
    fn notify(&self, stream: Stream, payload: &[u8]) {
        // Snapshot targets first; Bluedroid callbacks re-enter the state lock.
        let (handle, targets) = {
            let state = self.state.lock().unwrap();
            let (Some(gatt_if), Some(handle)) = (state.gatt_if, state.char_handles[stream as usize])
            else {
                return;
            };
            let targets: heapless::Vec<(GattInterface, ConnectionId), MAX_CONNECTIONS> = state
                .connections
                .iter()
                .filter(|conn| conn.subscribed[stream as usize])
                .map(|conn| (gatt_if, conn.conn_id))
                .collect();
            (handle, targets)
        };

        // Keep the stored attribute value current so plain reads return the
        // latest packet; the stack auto-responds to them.
        if let Err(e) = self.gatts.set_attr(handle, payload) {
            log::warn!("Updating {:?} attribute failed: {}", stream, e);
        }

        for (gatt_if, conn_id) in targets {
            if let Err(e) = self.gatts.notify(gatt_if, conn_id, handle, payload) {
                log::warn!("Notify {:?} to conn {} failed: {}", stream, conn_id, e);
            }
        }
    }

    fn on_gap_event(&self, event: BleGapEvent) -> Result<(), EspError> {
        if let BleGapEvent::AdvertisingConfigured(status) = event {
            self.check_bt_status(status)?;
            self.gap.start_advertising()?;
        }
        Ok(())
    }

    fn on_gatts_event(&self, gatt_if: GattInterface, event: GattsEvent) -> Result<(), EspError> {
        match event {
            GattsEvent::ServiceRegistered { status, app_id } => {
                self.check_gatt_status(status)?;
                if app_id == APP_ID {
                    self.state.lock().unwrap().gatt_if = Some(gatt_if);
                    self.gatts.create_service(
                        gatt_if,
                        &GattServiceId {
                            id: GattId {
                                uuid: BtUuid::uuid128(SENSOR_SERVICE_UUID),
                                inst_id: 0,
                            },
                            is_primary: true,
                        },
                        GATT_HANDLE_COUNT,
                    )?;
                }
            }
            GattsEvent::ServiceCreated {
                status,
                service_handle,
                ..
            } => {
                self.check_gatt_status(status)?;
                self.gatts.start_service(service_handle)?;
                self.add_characteristic(service_handle, STREAMS[0])?;
            }
            GattsEvent::CharacteristicAdded {
                status,
                attr_handle,
                service_handle,
                ..
            } => {
                self.check_gatt_status(status)?;
                {
                    let mut state = self.state.lock().unwrap();
                    let added = state.added;
                    state.char_handles[added] = Some(attr_handle);
                }
                // Every stream gets its own CCCD right after the value
                // attribute so the handle order stays deterministic.
                self.gatts.add_descriptor(
                    service_handle,
                    &GattDescriptor::new(
                        BtUuid::uuid16(CCCD_UUID),
                        Permission::Read | Permission::Write,
                    ),
                )?;
            }
            GattsEvent::DescriptorAdded {
                status,
                attr_handle,
                service_handle,
                ..
            } => {
                self.check_gatt_status(status)?;
                let next = {
                    let mut state = self.state.lock().unwrap();
                    let added = state.added;
                    state.cccd_handles[added] = Some(attr_handle);
                    state.added = added + 1;
                    added + 1
                };
                if next < STREAMS.len() {
                    self.add_characteristic(service_handle, STREAMS[next])?;
                } else {
                    log::info!("Sensor service ready ({} streams)", STREAMS.len());
                }
            }
            GattsEvent::PeerConnected { conn_id, addr, .. } => {
                let mut state = self.state.lock().unwrap();
                if state
                    .connections
                    .push(Connection {
                        peer: addr,
                        conn_id,
                        subscribed: [false; 3],
                    })
                    .is_err()
                {
                    log::warn!("Connection table full; dropping state for {}", addr);
                }
                log::info!("Client {} connected (conn {})", addr, conn_id);
            }
            GattsEvent::PeerDisconnected { addr, .. } => {
                let mut state = self.state.lock().unwrap();
                state.connections.retain(|conn| conn.peer != addr);
                drop(state);
                log::info!("Client {} disconnected", addr);
                // Bluedroid stops advertising on connect; resume so the
                // next client can find the board.
                self.gap.start_advertising()?;
            }
            GattsEvent::Write {
                conn_id,
                trans_id,
                handle,
                need_rsp,
                is_prep,
                value,
                ..
            } => {
                self.on_write(conn_id, handle, &value);
                if need_rsp && !is_prep {
                    let gatt_if = self.state.lock().unwrap().gatt_if;
                    if let Some(gatt_if) = gatt_if {
                        self.gatts
                            .send_response(gatt_if, conn_id, trans_id, GattStatus::Ok, None)?;
                    }
                }
            }
            _ => (),
        }
        Ok(())
    }

    fn add_characteristic(&self, service_handle: Handle, stream: Stream) -> Result<(), EspError> {
        self.gatts.add_characteristic(
            service_handle,
            &GattCharacteristic::new(
                stream.uuid(),
                Permission::Read.into(),
                Property::Read | Property::Notify,
                stream.max_len(),
                AutoResponse::ByGatt,
            ),
            &[],
        )
    }

    /// CCCD writes toggle a connection's per-stream subscription; the low
    /// bit of the first byte is the notify flag.
    fn on_write(&self, conn_id: ConnectionId, handle: Handle, value: &[u8]) {
        let enable = value.first().map(|b| b & 1 != 0).unwrap_or(false);
        let mut state = self.state.lock().unwrap();

        let Some(stream) = state
            .cccd_handles
            .iter()
            .position(|&h| h == Some(handle))
        else {
            return;
        };

        if let Some(conn) = state
            .connections
            .iter_mut()
            .find(|conn| conn.conn_id == conn_id)
        {
            conn.subscribed[stream] = enable;
            log::info!(
                "Conn {} {} {:?}",
                conn_id,
                if enable { "subscribed to" } else { "unsubscribed from" },
                STREAMS[stream]
            );
        }
    }

    fn check_bt_status(&self, status: BtStatus) -> Result<(), EspError> {
        if matches!(status, BtStatus::Success) {
            Ok(())
        } else {
            log::warn!("BT status: {:?}", status);
            Err(EspError::from_infallible::<ESP_FAIL>())
        }
    }

    fn check_gatt_status(&self, status: GattStatus) -> Result<(), EspError> {
        if matches!(status, GattStatus::Ok) {
            Ok(())
        } else {
            log::warn!("GATT status: {:?}", status);
            Err(EspError::from_infallible::<ESP_FAIL>())
        }
    }
}
