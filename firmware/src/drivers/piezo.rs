// Plank Board — Piezo Impact Driver
//
// Four piezo discs read one-shot through the raw ESP-IDF ADC API.
// GPIO15 sits on ADC2, so both oneshot units are opened; ADC2 is free to
// use here because the radio runs Bluetooth, not Wi-Fi.

use esp_idf_sys as sys;

use crate::config::*;

struct PiezoInput {
    unit: usize,
    channel: sys::adc_channel_t,
}

pub struct PiezoArray {
    handles: [sys::adc_oneshot_unit_handle_t; 2],
    inputs: [PiezoInput; PIEZO_COUNT],
}

impl PiezoArray {
    /// Configure both ADC units and the four input channels
    /// (GPIO36/39/35 on ADC1, GPIO15 on ADC2), 11 dB attenuation for the
    /// full 0–3.3 V swing.
    pub fn new() -> anyhow::Result<Self> {
        let inputs = [
            PiezoInput { unit: 0, channel: sys::adc_channel_t_ADC_CHANNEL_0 }, // GPIO36
            PiezoInput { unit: 0, channel: sys::adc_channel_t_ADC_CHANNEL_3 }, // GPIO39
            PiezoInput { unit: 1, channel: sys::adc_channel_t_ADC_CHANNEL_3 }, // GPIO15
            PiezoInput { unit: 0, channel: sys::adc_channel_t_ADC_CHANNEL_7 }, // GPIO35
        ];

        unsafe {
            let mut handles: [sys::adc_oneshot_unit_handle_t; 2] =
                [core::ptr::null_mut(), core::ptr::null_mut()];

            for (i, unit_id) in [sys::adc_unit_t_ADC_UNIT_1, sys::adc_unit_t_ADC_UNIT_2]
                .into_iter()
                .enumerate()
            {
                let unit_cfg = sys::adc_oneshot_unit_init_cfg_t {
                    unit_id,
                    ulp_mode: sys::adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                    ..core::mem::zeroed()
                };
                let ret = sys::adc_oneshot_new_unit(&unit_cfg, &mut handles[i]);
                if ret != sys::ESP_OK {
                    anyhow::bail!("ADC unit {} init failed ({})", i + 1, ret);
                }
            }

            let chan_cfg = sys::adc_oneshot_chan_cfg_t {
                atten: sys::adc_atten_t_ADC_ATTEN_DB_11,
                bitwidth: sys::adc_bitwidth_t_ADC_BITWIDTH_12,
            };
            for input in &inputs {
                let ret =
                    sys::adc_oneshot_config_channel(handles[input.unit], input.channel, &chan_cfg);
                if ret != sys::ESP_OK {
                    anyhow::bail!("ADC channel {} config failed ({})", input.channel, ret);
                }
            }

            Ok(Self { handles, inputs })
        }
    }

    /// Read all four discs, scaling the 12-bit conversions to the 16-bit
    /// wire range. A failed conversion reads as 0.
    pub fn read_all(&mut self) -> [u16; PIEZO_COUNT] {
        let mut values = [0u16; PIEZO_COUNT];
        for (value, input) in values.iter_mut().zip(&self.inputs) {
            let mut raw: i32 = 0;
            let ret = unsafe {
                sys::adc_oneshot_read(self.handles[input.unit], input.channel, &mut raw)
            };
            if ret == sys::ESP_OK {
                *value = (raw as u32 * 65_535 / 4_095) as u16;
            } else {
                log::warn!("Piezo ADC read failed on channel {} ({})", input.channel, ret);
            }
        }
        values
    }
}
