//! Modbus TCP 驱动
//!
//! 每次采集建立一条连接，按点位顺序读取寄存器后断开；
//! 同一物理端口的串行化由调度器通过资源锁保证。

use crate::error::DriverError;
use crate::types::{ModbusDeviceAddress, ModbusPoint, encode_registers, parse_registers};
use crate::{Driver, Fields, format_value};
use async_trait::async_trait;
use domain::Device;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, warn};

const DEFAULT_MODBUS_PORT: u16 = 502;
const DEFAULT_TIMEOUT_MS: u64 = 3_000;

/// Modbus TCP 驱动
#[derive(Debug, Clone, Default)]
pub struct ModbusTcpDriver;

impl ModbusTcpDriver {
    pub fn new() -> Self {
        Self
    }

    fn socket_addr(device: &Device) -> Result<SocketAddr, DriverError> {
        let port = if device.port_num == 0 {
            DEFAULT_MODBUS_PORT
        } else {
            device.port_num
        };
        format!("{}:{}", device.ip_address.trim(), port)
            .parse()
            .map_err(|e| DriverError::ConfigParse(format!("invalid address: {}", e)))
    }

    fn io_timeout(device: &Device) -> Duration {
        if device.timeout_ms > 0 {
            Duration::from_millis(device.timeout_ms as u64)
        } else {
            Duration::from_millis(DEFAULT_TIMEOUT_MS)
        }
    }

    async fn connect(device: &Device, address: &ModbusDeviceAddress) -> Result<Context, DriverError> {
        let addr = Self::socket_addr(device)?;
        let mut ctx = timeout(Self::io_timeout(device), tcp::connect(addr))
            .await
            .map_err(|_| DriverError::Timeout(format!("connect {}", addr)))?
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        ctx.set_slave(Slave(address.slave_id));
        Ok(ctx)
    }

    async fn read_point(ctx: &mut Context, point: &ModbusPoint) -> Result<f64, DriverError> {
        let count = point.register_count();
        let raw = match point.function_code {
            1 | 2 => {
                let bits = if point.function_code == 1 {
                    ctx.read_coils(point.register_address, 1)
                        .await
                        .map_err(|e| DriverError::Modbus(e.to_string()))?
                        .map_err(|e| DriverError::Modbus(format!("exception: {:?}", e)))?
                } else {
                    ctx.read_discrete_inputs(point.register_address, 1)
                        .await
                        .map_err(|e| DriverError::Modbus(e.to_string()))?
                        .map_err(|e| DriverError::Modbus(format!("exception: {:?}", e)))?
                };
                match bits.first() {
                    Some(true) => 1.0,
                    Some(false) => 0.0,
                    None => return Err(DriverError::DataParse("empty coils".to_string())),
                }
            }
            3 | 4 => {
                let registers = if point.function_code == 3 {
                    ctx.read_holding_registers(point.register_address, count)
                        .await
                        .map_err(|e| DriverError::Modbus(e.to_string()))?
                        .map_err(|e| DriverError::Modbus(format!("exception: {:?}", e)))?
                } else {
                    ctx.read_input_registers(point.register_address, count)
                        .await
                        .map_err(|e| DriverError::Modbus(e.to_string()))?
                        .map_err(|e| DriverError::Modbus(format!("exception: {:?}", e)))?
                };
                debug!(
                    target: "fsu.driver",
                    point = %point.name,
                    register = point.register_address,
                    count,
                    values = ?registers,
                    "read_modbus_registers"
                );
                parse_registers(&registers, point.data_type, point.byte_order)?
            }
            other => {
                return Err(DriverError::ConfigParse(format!(
                    "unsupported function code: {}",
                    other
                )));
            }
        };
        Ok(point.apply_scale(raw))
    }

    async fn read_all(
        ctx: &mut Context,
        device: &Device,
        address: &ModbusDeviceAddress,
    ) -> Result<Fields, DriverError> {
        let mut fields = Fields::new();
        let mut last_error = None;
        for point in &address.points {
            match Self::read_point(ctx, point).await {
                Ok(value) => {
                    fields.insert(point.name.clone(), format_value(value));
                }
                Err(err) => {
                    warn!(
                        target: "fsu.driver",
                        device_id = device.id,
                        point = %point.name,
                        error = %err,
                        "modbus_point_read_failed"
                    );
                    last_error = Some(err);
                }
            }
        }
        // 全部点位失败才视为采集失败
        match last_error {
            Some(err) if fields.is_empty() => Err(err),
            _ => Ok(fields),
        }
    }

    async fn write_point(ctx: &mut Context, point: &ModbusPoint, value: &str) -> Result<(), DriverError> {
        let parsed = parse_write_value(value)?;
        match point.function_code {
            1 => ctx
                .write_single_coil(point.register_address, parsed != 0.0)
                .await
                .map_err(|e| DriverError::Modbus(e.to_string()))?
                .map_err(|e| DriverError::Modbus(format!("exception: {:?}", e))),
            3 => {
                let words =
                    encode_registers(point.remove_scale(parsed), point.data_type, point.byte_order)?;
                if let [word] = words.as_slice() {
                    ctx.write_single_register(point.register_address, *word)
                        .await
                        .map_err(|e| DriverError::Modbus(e.to_string()))?
                        .map_err(|e| DriverError::Modbus(format!("exception: {:?}", e)))
                } else {
                    ctx.write_multiple_registers(point.register_address, &words)
                        .await
                        .map_err(|e| DriverError::Modbus(e.to_string()))?
                        .map_err(|e| DriverError::Modbus(format!("exception: {:?}", e)))
                }
            }
            _ => Err(DriverError::ReadOnly(point.name.clone())),
        }
    }
}

/// 下行值：布尔文本或数值
fn parse_write_value(value: &str) -> Result<f64, DriverError> {
    let trimmed = value.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "on" => return Ok(1.0),
        "false" | "off" => return Ok(0.0),
        _ => {}
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| DriverError::DataParse(format!("invalid write value: {}", value)))
}

#[async_trait]
impl Driver for ModbusTcpDriver {
    async fn collect(&self, device: &Device) -> Result<Fields, DriverError> {
        let address = ModbusDeviceAddress::from_json(&device.device_address)?;
        if address.points.is_empty() {
            return Err(DriverError::ConfigParse("no points configured".to_string()));
        }
        let mut ctx = Self::connect(device, &address).await?;
        timeout(
            Self::io_timeout(device) * address.points.len() as u32,
            Self::read_all(&mut ctx, device, &address),
        )
        .await
        .map_err(|_| DriverError::Timeout(format!("collect device {}", device.id)))?
    }

    async fn write(&self, device: &Device, field: &str, value: &str) -> Result<(), DriverError> {
        let address = ModbusDeviceAddress::from_json(&device.device_address)?;
        let point = address
            .point(field)
            .ok_or_else(|| DriverError::UnknownField(field.to_string()))?;
        if !point.writable {
            return Err(DriverError::ReadOnly(field.to_string()));
        }
        let mut ctx = Self::connect(device, &address).await?;
        timeout(Self::io_timeout(device), Self::write_point(&mut ctx, point, value))
            .await
            .map_err(|_| DriverError::Timeout(format!("write device {}", device.id)))?
    }
}
