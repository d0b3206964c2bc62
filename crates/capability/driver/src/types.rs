//! Modbus 点位与地址配置

use crate::error::DriverError;
use serde::{Deserialize, Serialize};

/// Modbus 寄存器数据类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusDataType {
    /// 16位有符号整数
    #[default]
    Int16,
    /// 16位无符号整数
    Uint16,
    /// 32位有符号整数（2个寄存器）
    Int32,
    /// 32位无符号整数（2个寄存器）
    Uint32,
    /// 32位浮点数（2个寄存器）
    Float32,
    /// 64位浮点数（4个寄存器）
    Float64,
}

impl ModbusDataType {
    /// 该类型占用的寄存器数
    pub fn register_width(self) -> u16 {
        match self {
            Self::Int16 | Self::Uint16 => 1,
            Self::Int32 | Self::Uint32 | Self::Float32 => 2,
            Self::Float64 => 4,
        }
    }
}

/// 多寄存器字序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// 高字在前
    #[default]
    BigEndian,
    /// 低字在前
    LittleEndian,
}

/// 点位配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusPoint {
    /// 上报字段名
    pub name: String,
    /// 功能码（1/2/3/4）
    #[serde(default = "default_function_code")]
    pub function_code: u8,
    /// 寄存器起始地址
    pub register_address: u16,
    /// 寄存器数量，缺省按数据类型推断
    #[serde(default)]
    pub register_count: Option<u16>,
    #[serde(default)]
    pub data_type: ModbusDataType,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub offset: Option<f64>,
    /// 是否允许下行写入
    #[serde(default)]
    pub writable: bool,
}

fn default_function_code() -> u8 {
    3
}

impl ModbusPoint {
    pub fn register_count(&self) -> u16 {
        self.register_count
            .filter(|count| *count > 0)
            .unwrap_or_else(|| self.data_type.register_width())
    }

    /// 原始值 → 工程值
    pub fn apply_scale(&self, raw: f64) -> f64 {
        match (self.scale, self.offset) {
            (Some(scale), Some(offset)) => raw * scale + offset,
            (Some(scale), None) => raw * scale,
            (None, Some(offset)) => raw + offset,
            (None, None) => raw,
        }
    }

    /// 工程值 → 原始值
    pub fn remove_scale(&self, value: f64) -> f64 {
        let shifted = value - self.offset.unwrap_or(0.0);
        match self.scale {
            Some(scale) if scale != 0.0 => shifted / scale,
            _ => shifted,
        }
    }
}

/// 设备地址配置（Modbus）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusDeviceAddress {
    /// 从站 ID (1-247)
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    #[serde(default)]
    pub points: Vec<ModbusPoint>,
}

fn default_slave_id() -> u8 {
    1
}

impl ModbusDeviceAddress {
    /// 从 `device.device_address` 解析
    pub fn from_json(json: &str) -> Result<Self, DriverError> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Err(DriverError::ConfigParse("device address is empty".to_string()));
        }
        serde_json::from_str(trimmed)
            .map_err(|e| DriverError::ConfigParse(format!("device address: {}", e)))
    }

    pub fn point(&self, name: &str) -> Option<&ModbusPoint> {
        self.points.iter().find(|point| point.name == name)
    }
}

/// 解析寄存器数据为浮点值
pub fn parse_registers(
    registers: &[u16],
    data_type: ModbusDataType,
    byte_order: ByteOrder,
) -> Result<f64, DriverError> {
    if registers.is_empty() {
        return Err(DriverError::DataParse("empty registers".to_string()));
    }
    let width = data_type.register_width() as usize;
    if registers.len() < width {
        return Err(DriverError::DataParse(format!(
            "need {} registers for {:?}",
            width, data_type
        )));
    }
    let mut words: Vec<u16> = registers[..width].to_vec();
    if byte_order == ByteOrder::LittleEndian {
        words.reverse();
    }
    let bits = words
        .iter()
        .fold(0u64, |acc, word| (acc << 16) | *word as u64);

    let value = match data_type {
        ModbusDataType::Int16 => bits as u16 as i16 as f64,
        ModbusDataType::Uint16 => bits as u16 as f64,
        ModbusDataType::Int32 => bits as u32 as i32 as f64,
        ModbusDataType::Uint32 => bits as u32 as f64,
        ModbusDataType::Float32 => f32::from_bits(bits as u32) as f64,
        ModbusDataType::Float64 => f64::from_bits(bits),
    };
    Ok(value)
}

/// 将原始值编码为寄存器
pub fn encode_registers(
    raw: f64,
    data_type: ModbusDataType,
    byte_order: ByteOrder,
) -> Result<Vec<u16>, DriverError> {
    if !raw.is_finite() {
        return Err(DriverError::DataParse(format!("value not finite: {}", raw)));
    }
    let bits: u64 = match data_type {
        ModbusDataType::Int16 => raw.round() as i16 as u16 as u64,
        ModbusDataType::Uint16 => raw.round() as u16 as u64,
        ModbusDataType::Int32 => raw.round() as i32 as u32 as u64,
        ModbusDataType::Uint32 => raw.round() as u32 as u64,
        ModbusDataType::Float32 => (raw as f32).to_bits() as u64,
        ModbusDataType::Float64 => raw.to_bits(),
    };
    let width = data_type.register_width() as usize;
    let mut words: Vec<u16> = (0..width)
        .rev()
        .map(|index| (bits >> (index * 16)) as u16)
        .collect();
    if byte_order == ByteOrder::LittleEndian {
        words.reverse();
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registers_int16() {
        let value = parse_registers(&[100u16], ModbusDataType::Int16, ByteOrder::BigEndian).unwrap();
        assert_eq!(value, 100.0);

        let registers = [(-100i16) as u16];
        let value = parse_registers(&registers, ModbusDataType::Int16, ByteOrder::BigEndian).unwrap();
        assert_eq!(value, -100.0);
    }

    #[test]
    fn test_parse_registers_float32_word_order() {
        let bits = 25.5f32.to_bits();
        let high = (bits >> 16) as u16;
        let low = bits as u16;
        let big = parse_registers(&[high, low], ModbusDataType::Float32, ByteOrder::BigEndian).unwrap();
        assert_eq!(big, 25.5);
        let little =
            parse_registers(&[low, high], ModbusDataType::Float32, ByteOrder::LittleEndian).unwrap();
        assert_eq!(little, 25.5);
    }

    #[test]
    fn test_parse_registers_too_short() {
        let err = parse_registers(&[1], ModbusDataType::Uint32, ByteOrder::BigEndian).unwrap_err();
        assert!(err.to_string().contains("need 2 registers"));
    }

    #[test]
    fn test_encode_then_parse_int32() {
        let words = encode_registers(-70000.0, ModbusDataType::Int32, ByteOrder::BigEndian).unwrap();
        assert_eq!(words.len(), 2);
        let value = parse_registers(&words, ModbusDataType::Int32, ByteOrder::BigEndian).unwrap();
        assert_eq!(value, -70000.0);
    }

    #[test]
    fn test_parse_device_address() {
        let json = r#"{"slave_id": 2, "points": [{"name": "temp", "register_address": 100, "data_type": "float32", "scale": 0.1}]}"#;
        let addr = ModbusDeviceAddress::from_json(json).unwrap();
        assert_eq!(addr.slave_id, 2);
        let point = addr.point("temp").unwrap();
        assert_eq!(point.function_code, 3);
        assert_eq!(point.register_count(), 2);
        assert_eq!(point.byte_order, ByteOrder::BigEndian);
        assert!((point.apply_scale(250.0) - 25.0).abs() < 1e-9);
        assert!((point.remove_scale(25.0) - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_device_address_rejected() {
        assert!(ModbusDeviceAddress::from_json("  ").is_err());
    }
}
