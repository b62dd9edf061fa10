use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dbus::arg::{PropMap, RefArg, Variant};
use dbus::blocking::stdintf::org_freedesktop_dbus::{ObjectManager, Properties};
use dbus::blocking::Connection;
use thiserror::Error;
use tracing::{info, warn};

/// Servicio Nordic UART (micro:bit)
pub const UART_SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
/// Característica en la que escribe el host (RX del periférico)
pub const UART_RX_CHARACTERISTIC_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

const BLUEZ: &str = "org.bluez";

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] dbus::Error),

    #[error("Dispositivo {0} no encontrado")]
    DeviceNotFound(String),

    #[error("El dispositivo no expone la característica UART RX")]
    CharacteristicNotFound,

    #[error("Enlace no conectado")]
    NotConnected,

    #[error("Fallo de escritura: {0}")]
    Write(String),
}

/// Primitiva de enlace serie inalámbrico: conectar, escribir una trama, desconectar.
/// Las llamadas bloquean hasta que el transporte responde.
pub trait Link: Send {
    /// Completa el handshake y devuelve un nombre legible del periférico
    fn connect(&mut self) -> Result<String, LinkError>;

    fn write(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    fn disconnect(&mut self);
}

/// Enlace BLE hacia un periférico Nordic UART a través de BlueZ (D-Bus del sistema)
pub struct BluezUartLink {
    adapter: String,
    target_mac: String,
    conn: Option<Connection>,
    rx_char_path: Option<String>,
}

impl BluezUartLink {
    pub fn new(adapter: &str, target_mac: &str) -> Self {
        Self {
            adapter: adapter.to_string(),
            target_mac: target_mac.to_string(),
            conn: None,
            rx_char_path: None,
        }
    }

    fn adapter_path(&self) -> String {
        format!("/org/bluez/{}", self.adapter)
    }

    fn device_path(&self) -> String {
        format!(
            "{}/dev_{}",
            self.adapter_path(),
            self.target_mac.replace(':', "_")
        )
    }

    /// Busca la característica RX del servicio UART bajo la ruta del dispositivo
    fn find_rx_characteristic(&self, conn: &Connection) -> Result<String, LinkError> {
        let root = conn.with_proxy(BLUEZ, "/", Duration::from_secs(5));
        let objects = root.get_managed_objects()?;
        let device_path = self.device_path();

        objects
            .iter()
            .filter(|(path, _)| path.starts_with(&device_path))
            .find_map(|(path, ifaces)| {
                let props = ifaces.get("org.bluez.GattCharacteristic1")?;
                let uuid = props.get("UUID")?.0.as_str()?;
                uuid.eq_ignore_ascii_case(UART_RX_CHARACTERISTIC_UUID)
                    .then(|| path.to_string())
            })
            .ok_or(LinkError::CharacteristicNotFound)
    }
}

impl Link for BluezUartLink {
    fn connect(&mut self) -> Result<String, LinkError> {
        let conn = Connection::new_system()?;
        info!("🔌 Conectado a D-Bus del sistema");

        let adapter_proxy = conn.with_proxy(BLUEZ, self.adapter_path(), Duration::from_secs(5));
        let _: () = adapter_proxy.method_call(
            "org.freedesktop.DBus.Properties",
            "Set",
            ("org.bluez.Adapter1", "Powered", Variant(true)),
        )?;

        let device_path = self.device_path();
        info!("🔍 Buscando dispositivo en: {}", device_path);
        let device_proxy = conn.with_proxy(BLUEZ, device_path.as_str(), Duration::from_secs(10));
        device_proxy
            .method_call::<(), _, _, _>("org.bluez.Device1", "Connect", ())
            .map_err(|e| {
                if e.name() == Some("org.freedesktop.DBus.Error.UnknownObject") {
                    LinkError::DeviceNotFound(self.target_mac.clone())
                } else {
                    LinkError::Dbus(e)
                }
            })?;

        let name: String = device_proxy
            .get("org.bluez.Device1", "Name")
            .unwrap_or_else(|_| self.target_mac.clone());

        let rx_char_path = self.find_rx_characteristic(&conn)?;
        info!("📡 Característica UART RX en {}", rx_char_path);

        self.rx_char_path = Some(rx_char_path);
        self.conn = Some(conn);
        Ok(name)
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let (conn, path) = match (&self.conn, &self.rx_char_path) {
            (Some(conn), Some(path)) => (conn, path),
            _ => return Err(LinkError::NotConnected),
        };

        let char_proxy = conn.with_proxy(BLUEZ, path.as_str(), Duration::from_secs(2));
        let options = PropMap::new();
        char_proxy
            .method_call::<(), _, _, _>(
                "org.bluez.GattCharacteristic1",
                "WriteValue",
                (frame.to_vec(), options),
            )
            .map_err(|e| {
                if e.name() == Some("org.bluez.Error.NotConnected") {
                    LinkError::NotConnected
                } else {
                    LinkError::Write(e.to_string())
                }
            })
    }

    fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            let device_proxy = conn.with_proxy(BLUEZ, self.device_path(), Duration::from_secs(5));
            let result: Result<(), _> =
                device_proxy.method_call("org.bluez.Device1", "Disconnect", ());
            if let Err(e) = result {
                warn!("⚠️  Error al desconectar {}: {}", self.target_mac, e);
            }
        }
        self.rx_char_path = None;
    }
}

/// Enlace en memoria: guarda cada trama escrita. Útil para replays y tests.
#[derive(Clone, Default)]
pub struct MemoryLink {
    frames: Arc<Mutex<Vec<String>>>,
    fail_connect: bool,
    fail_writes: Arc<Mutex<usize>>,
    write_delay: Duration,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// El handshake siempre falla
    pub fn failing_connect() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    /// Cada escritura tarda `delay` en resolverse
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Las próximas `n` escrituras fallan
    pub fn fail_next_writes(&self, n: usize) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = n;
    }

    /// Tramas escritas hasta ahora (sin el '\n' final)
    pub fn frames(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Link for MemoryLink {
    fn connect(&mut self) -> Result<String, LinkError> {
        if self.fail_connect {
            return Err(LinkError::DeviceNotFound("memory".to_string()));
        }
        Ok("memory".to_string())
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        {
            let mut failures = self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner);
            if *failures > 0 {
                *failures -= 1;
                return Err(LinkError::Write("fallo simulado".to_string()));
            }
        }
        let text = String::from_utf8_lossy(frame);
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.trim_end_matches('\n').to_string());
        Ok(())
    }

    fn disconnect(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path_from_mac() {
        let link = BluezUartLink::new("hci1", "E3:5A:12:00:00:01");
        assert_eq!(link.device_path(), "/org/bluez/hci1/dev_E3_5A_12_00_00_01");
    }

    #[test]
    fn test_bluez_write_without_connect() {
        let mut link = BluezUartLink::new("hci0", "E3:5A:12:00:00:01");
        assert!(matches!(link.write(b"stop\n"), Err(LinkError::NotConnected)));
    }

    #[test]
    fn test_memory_link_records_frames() {
        let link = MemoryLink::new();
        let mut writer = link.clone();
        assert_eq!(writer.connect().unwrap(), "memory");

        link.fail_next_writes(1);
        assert!(writer.write(b"IDfist\n").is_err());
        writer.write(b"IDfist\n").unwrap();
        writer.write(b"stop\n").unwrap();
        assert_eq!(link.frames(), vec!["IDfist".to_string(), "stop".to_string()]);
    }

    #[test]
    fn test_memory_link_failing_connect() {
        let mut link = MemoryLink::failing_connect();
        assert!(matches!(link.connect(), Err(LinkError::DeviceNotFound(_))));
    }
}
