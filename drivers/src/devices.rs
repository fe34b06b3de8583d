use crate::device;
use crate::model::Model;
use crate::transport;
use crate::transport::SystemClock;
use crate::transport::UsbTransport;
use rusb::UsbContext;

macro_rules! register {
    ($($module:ident),+ $(,)?) => {
        paste::paste! {
            $(
                pub mod $module;
            )+

            /// Every supported scanner model.
            #[derive(Debug, Copy, Clone, PartialEq, Eq)]
            pub enum Type {
                $(
                    [<$module:camel>],
                )+
            }

            pub const TYPES: &[Type] = &[
                $(
                    Type::[<$module:camel>],
                )+
            ];

            impl std::fmt::Display for Type {
                fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    match self {
                        $(
                            Self::[<$module:camel>] => write!(formatter, stringify!($module)),
                        )+
                    }
                }
            }

            impl Type {
                pub fn name(self) -> &'static str {
                    self.model().name
                }

                pub fn model(self) -> &'static Model {
                    match self {
                        $(
                            Type::[<$module:camel>] => &$module::MODEL,
                        )+
                    }
                }

                /// Model lookup by USB identifiers, for hotplug matching.
                pub fn from_ids(vendor_id: u16, product_id: u16) -> Option<Type> {
                    $(
                        if $module::MODEL.vendor_id == vendor_id
                            && $module::MODEL.product_id == product_id
                        {
                            return Some(Type::[<$module:camel>]);
                        }
                    )+
                    None
                }
            }

            #[derive(Debug, PartialEq, Eq)]
            pub struct ParseTypeError {
                on: String,
            }

            impl std::fmt::Display for ParseTypeError {
                fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    write!(formatter, "unknown device type \"{}\"", self.on)
                }
            }

            impl std::str::FromStr for Type {
                type Err = ParseTypeError;

                fn from_str(string: &str) -> Result<Self, Self::Err> {
                    match string {
                        $(
                            stringify!($module) => Ok(Self::[<$module:camel>]),
                        )+
                        _ => Err(Self::Err { on: string.to_owned() }),
                    }
                }
            }
        }
    };
}

register! { canoscan_4400f, canoscan_lide_100, canoscan_lide_110 }

pub struct ListedDevice {
    pub device_type: Type,
    pub bus_number: u8,
    pub address: u8,
}

/// Enumerates supported scanners on the bus without opening them.
pub fn list_devices() -> rusb::Result<Vec<ListedDevice>> {
    let context = rusb::Context::new()?;
    let mut result = Vec::new();
    for device in context.devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(_) => continue,
        };
        if let Some(device_type) =
            Type::from_ids(descriptor.vendor_id(), descriptor.product_id())
        {
            result.push(ListedDevice {
                device_type,
                bus_number: device.bus_number(),
                address: device.address(),
            });
        }
    }
    Ok(result)
}

/// Opens a scanner over USB. With a type, only that model is considered;
/// without one, the first supported scanner on the bus wins.
pub fn open(
    device_type: Option<Type>,
    serial: Option<&str>,
) -> Result<device::Device<UsbTransport, SystemClock>, crate::error::Error> {
    let context = rusb::Context::new().map_err(transport::Error::from)?;
    let types: &[Type] = match device_type {
        Some(ref device_type) => std::slice::from_ref(device_type),
        None => TYPES,
    };
    for device_type in types {
        let model = device_type.model();
        match UsbTransport::open(&context, model.vendor_id, model.product_id, serial) {
            Ok(transport) => {
                log::info!("opened {}", model.name);
                return Ok(device::Device::new(model, transport, SystemClock::new()));
            }
            Err(transport::Error::Device) => continue,
            Err(error) => return Err(error.into()),
        }
    }
    Err(match serial {
        Some(serial) => transport::Error::Serial(serial.to_owned()).into(),
        None => transport::Error::Device.into(),
    })
}
