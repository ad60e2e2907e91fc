use std::io;
use std::path::Path;

use cmd_lib::*;
use log::info;

use crate::error::{BootstrapError, Result};

/// Host service manager operations the activator needs.
pub trait ServiceManager {
    fn enable(&self, service: &str) -> io::Result<()>;
    fn start(&self, service: &str) -> io::Result<()>;
}

/// systemd-backed service manager. Legacy init scripts delivered in the
/// bundle can lose their execute bit in transit, so it is restored
/// before the service is enabled.
pub struct Systemd;

impl ServiceManager for Systemd {
    fn enable(&self, service: &str) -> io::Result<()> {
        let init_script = format!("/etc/init.d/{service}");
        if Path::new(&init_script).exists() {
            run_cmd!(chmod +x $init_script)?;
        }
        run_cmd!(systemctl enable $service)
    }

    fn start(&self, service: &str) -> io::Result<()> {
        run_cmd!(systemctl start $service)
    }
}

/// Enable and start services in list order. Callers are responsible for
/// listing services in a startable order; the first non-zero exit halts
/// the remaining list.
pub fn activate(manager: &dyn ServiceManager, services: &[String]) -> Result<()> {
    for service in services {
        info!("Enabling service {service}");
        manager.enable(service).map_err(|e| BootstrapError::Service {
            service: service.clone(),
            source: e,
        })?;
        info!("Starting service {service}");
        manager.start(service).map_err(|e| BootstrapError::Service {
            service: service.clone(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeManager {
        log: RefCell<Vec<String>>,
        fail_start: Option<&'static str>,
    }

    impl ServiceManager for FakeManager {
        fn enable(&self, service: &str) -> io::Result<()> {
            self.log.borrow_mut().push(format!("enable {service}"));
            Ok(())
        }

        fn start(&self, service: &str) -> io::Result<()> {
            self.log.borrow_mut().push(format!("start {service}"));
            if self.fail_start == Some(service) {
                return Err(io::Error::other("exit code 1"));
            }
            Ok(())
        }
    }

    fn services(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_services_activate_in_list_order() {
        let manager = FakeManager::default();
        activate(&manager, &services(&["web", "worker"])).unwrap();
        assert_eq!(
            *manager.log.borrow(),
            ["enable web", "start web", "enable worker", "start worker"]
        );
    }

    #[test]
    fn test_start_failure_halts_remaining_services() {
        let manager = FakeManager {
            fail_start: Some("worker"),
            ..FakeManager::default()
        };
        let err = activate(&manager, &services(&["web", "worker", "cache"])).unwrap_err();
        match err {
            BootstrapError::Service { service, .. } => assert_eq!(service, "worker"),
            other => panic!("expected service error, got {other}"),
        }
        // web was fully activated, worker was attempted, cache never was.
        assert_eq!(
            *manager.log.borrow(),
            ["enable web", "start web", "enable worker", "start worker"]
        );
    }

    #[test]
    fn test_empty_service_list_is_a_noop() {
        let manager = FakeManager::default();
        activate(&manager, &[]).unwrap();
        assert!(manager.log.borrow().is_empty());
    }
}
