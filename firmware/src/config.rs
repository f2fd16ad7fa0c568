// Plank Board — Hardware & System Configuration
// Target: DFRobot FireBeetle 2 ESP32-E

// ---------------------------------------------------------------------------
// GPIO Pin Map (FireBeetle 2 ESP32-E)
// ---------------------------------------------------------------------------
// Strain gauge bank (HX711 x4): shared clock GPIO18, data GPIO25/26/0/14.
// Piezo discs (ADC):            GPIO36 (A0), GPIO39 (A1), GPIO15 (A4), GPIO35 (A3).
// Capacitive MCU link (UART2):  RX GPIO16, TX GPIO17.
// Pins are bound to typed peripherals in main.rs; this map is the reference.

// ---------------------------------------------------------------------------
// Sensor Topology
// ---------------------------------------------------------------------------
pub const STRAIN_CHANNEL_COUNT: usize = 4;
pub const CAPACITIVE_PAD_COUNT: usize = 16;
pub const PIEZO_COUNT: usize = 4;

// ---------------------------------------------------------------------------
// Tare Policy
// ---------------------------------------------------------------------------
pub const TARE_SAMPLES: u8 = 20;               // raw reads averaged per attempt
pub const TARE_TOLERANCE: u32 = 10_000;        // max raw spread per channel
pub const TARE_RETRY_DEADLINE_MS: u64 = 4_000; // wall-clock budget for retries

// ---------------------------------------------------------------------------
// Scheduling (milliseconds)
// ---------------------------------------------------------------------------
pub const COMBINED_INTERVAL_MS: u64 = 100;     // capacitive + strain, 10 Hz
pub const PIEZO_INTERVAL_MS: u64 = 20;         // piezo impacts, 50 Hz
pub const SCHEDULER_TICK_MS: u64 = 5;
pub const IDLE_POWER_DOWN_MS: u64 = 30_000;    // no BLE client -> scales to standby

// The HX711 converts at 10 SPS; one and a half periods covers clock skew.
pub const STRAIN_READ_TIMEOUT_US: u32 = 150_000;

// ---------------------------------------------------------------------------
// Strain Scaling (raw counts -> one wire byte)
// ---------------------------------------------------------------------------
pub const STRAIN_COUNTS_PER_GRAM: i32 = 842;
pub const STRAIN_FULL_SCALE_GRAMS: i32 = 2_500;

// ---------------------------------------------------------------------------
// Capacitive Link (UART)
// ---------------------------------------------------------------------------
pub const CAPACITIVE_BAUD_RATE: u32 = 115_200;
pub const CAPACITIVE_FRAME_MAX: usize = 100;   // runaway-frame guard

// ---------------------------------------------------------------------------
// BLE Identity (wire-compatible with the deployed Python client)
// ---------------------------------------------------------------------------
pub const BLE_DEVICE_NAME: &str = "ESP32_Multi_Sensor";
pub const SENSOR_SERVICE_UUID: u128 = 0x4fafc201_1fb5_459e_8fcc_c5c9c331914b;
pub const CAPACITIVE_CHAR_UUID: u128 = 0xbeb5483e_36e1_4688_b7f5_ea07361b26a8;
pub const STRAIN_CHAR_UUID: u128 = 0xcc54f4ce_1037_4b73_9e5a_cdcd53e85145;
pub const PIEZO_CHAR_UUID: u128 = 0xbeb5483e_36e1_4688_b7f5_ea07361b26a9;

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
pub const STACK_ACQUISITION: usize = 8192;
pub const STACK_TELEMETRY: usize = 8192;
