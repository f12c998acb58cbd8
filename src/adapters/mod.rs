//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                       | Connects to              |
//! |------------|----------------------------------|--------------------------|
//! | `log_sink` | EventSink, NotificationCapability| `log` facade             |
//! | `sim`      | SensorCapability                 | simulated sensors        |
//! |            | SwitchCapability                 | simulated fan / switches |
//! | `store`    | StoragePort                      | memory map / directory   |
//! | `time`     | Clock                            | host clock / manual time |

pub mod log_sink;
pub mod sim;
pub mod store;
pub mod time;
