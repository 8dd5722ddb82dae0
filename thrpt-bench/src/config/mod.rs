mod attack;
mod receiver;
mod scenario;
mod target;

pub use self::{
    attack::{AttackConfig, AttackMode},
    receiver::{DuplicatePolicyArg, ReceiverConfig},
    scenario::Scenario,
    target::TargetConfig,
};

/// Builds a `$config` where every property comes from `$overwrite` when
/// defined there, from `$scenario` otherwise. The origin of every property is logged.
macro_rules! merge_config {
    ($config:ident, $scenario:expr, $overwrite:expr, {$($property:ident),+ $(,)?}) => {{
        let scenario = $scenario;
        let overwrite = $overwrite;
        $config {
            $(
                $property: if let Some(value) = overwrite.$property {
                    ::rama::telemetry::tracing::info!("property '{}': use overwrite: {value}", stringify!($property));
                    Some(value)
                } else if let Some(value) = scenario.$property {
                    ::rama::telemetry::tracing::info!("property '{}': use scenario: {value}", stringify!($property));
                    Some(value)
                } else {
                    ::rama::telemetry::tracing::info!("property '{}': undefined", stringify!($property));
                    None
                },
            )+
        }
    }};
}

pub(crate) use merge_config;
