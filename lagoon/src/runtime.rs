use std::future::Future;

#[cfg(target_os = "linux")]
use monoio::IoUringDriver;
use monoio::{time::TimeDriver, LegacyDriver, Runtime, RuntimeBuilder};

use lagoon_core::config::{RuntimeConfig, RuntimeType};

pub enum RuntimeWrapper {
    #[cfg(target_os = "linux")]
    IoUring(Runtime<TimeDriver<IoUringDriver>>),
    Legacy(Runtime<TimeDriver<LegacyDriver>>),
}

impl From<&RuntimeConfig> for RuntimeWrapper {
    fn from(_config: &RuntimeConfig) -> Self {
        #[cfg(target_os = "linux")]
        let runtime_type =
            if _config.runtime_type == RuntimeType::IoUring && monoio::utils::detect_uring() {
                RuntimeType::IoUring
            } else {
                RuntimeType::Legacy
            };
        #[cfg(not(target_os = "linux"))]
        let runtime_type = RuntimeType::Legacy;

        match runtime_type {
            #[cfg(target_os = "linux")]
            RuntimeType::IoUring => {
                let runtime = RuntimeBuilder::<IoUringDriver>::new()
                    .enable_timer()
                    .with_entries(_config.entries)
                    .build()
                    .expect("build io_uring runtime");
                RuntimeWrapper::IoUring(runtime)
            }
            RuntimeType::Legacy => {
                let runtime = RuntimeBuilder::<LegacyDriver>::new()
                    .enable_timer()
                    .build()
                    .expect("build legacy runtime");
                RuntimeWrapper::Legacy(runtime)
            }
        }
    }
}

impl RuntimeWrapper {
    pub fn block_on<F>(&mut self, future: F) -> F::Output
    where
        F: Future,
    {
        match self {
            #[cfg(target_os = "linux")]
            RuntimeWrapper::IoUring(driver) => driver.block_on(future),
            RuntimeWrapper::Legacy(driver) => driver.block_on(future),
        }
    }
}
