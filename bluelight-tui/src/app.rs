use bluelight_agent::{Device, TrustedKeys};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPanel {
    Devices,
    Keys,
}

/// What the main loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Refresh,
    Quit,
}

pub struct App {
    /// Named or bonded devices, bonded first
    pub devices: Vec<Device>,
    /// Bonded devices, candidates for keys
    pub paired: Vec<Device>,
    pub keys: TrustedKeys,
    pub selected_device: usize,
    pub selected_key: usize,
    pub focused_panel: FocusedPanel,
    pub status: Option<String>,
}

impl App {
    pub fn new(keys: TrustedKeys) -> Self {
        Self {
            devices: Vec::new(),
            paired: Vec::new(),
            keys,
            selected_device: 0,
            selected_key: 0,
            focused_panel: FocusedPanel::Devices,
            status: None,
        }
    }

    pub fn set_devices(&mut self, devices: Vec<Device>) {
        self.paired = devices.iter().filter(|d| d.is_bonded()).cloned().collect();
        // Bonded devices stay visible so they can always be forgotten
        self.devices = devices
            .into_iter()
            .filter(|d| d.is_bonded() || !d.is_unnamed())
            .collect();

        self.keys
            .retain_known(self.paired.iter().map(|d| d.address()));

        self.selected_device = clamp(self.selected_device, self.devices.len());
        self.selected_key = clamp(self.selected_key, self.paired.len());
    }

    /// Only presses count; repeats and releases are ignored.
    pub fn handle_key(&mut self, key: KeyEvent) -> KeyAction {
        if key.kind != KeyEventKind::Press {
            return KeyAction::None;
        }
        match key.code {
            KeyCode::Char('q') => return KeyAction::Quit,
            KeyCode::Left => self.focus(FocusedPanel::Devices),
            KeyCode::Right => self.focus(FocusedPanel::Keys),
            KeyCode::Tab => self.next_panel(),
            KeyCode::Up => self.previous(),
            KeyCode::Down => self.next(),
            KeyCode::Enter => {
                if self.activate() {
                    return KeyAction::Refresh;
                }
            }
            KeyCode::Char('v') => self.verify_selected(),
            KeyCode::Char('r') => return KeyAction::Refresh,
            _ => {}
        }
        KeyAction::None
    }

    pub fn previous(&mut self) {
        match self.focused_panel {
            FocusedPanel::Devices => self.selected_device = self.selected_device.saturating_sub(1),
            FocusedPanel::Keys => self.selected_key = self.selected_key.saturating_sub(1),
        }
    }

    pub fn next(&mut self) {
        match self.focused_panel {
            FocusedPanel::Devices => {
                self.selected_device = clamp(self.selected_device + 1, self.devices.len())
            }
            FocusedPanel::Keys => self.selected_key = clamp(self.selected_key + 1, self.paired.len()),
        }
    }

    pub fn next_panel(&mut self) {
        self.focused_panel = match self.focused_panel {
            FocusedPanel::Devices => FocusedPanel::Keys,
            FocusedPanel::Keys => FocusedPanel::Devices,
        };
    }

    pub fn focus(&mut self, panel: FocusedPanel) {
        self.focused_panel = panel;
    }

    pub fn get_selected_device(&self) -> Option<&Device> {
        match self.focused_panel {
            FocusedPanel::Devices => self.devices.get(self.selected_device),
            FocusedPanel::Keys => self.paired.get(self.selected_key),
        }
    }

    pub fn is_key(&self, device: &Device) -> bool {
        self.keys.contains(device.address())
    }

    /// Enter on the focused panel. Returns `true` when the device list
    /// should be refreshed.
    pub fn activate(&mut self) -> bool {
        match self.focused_panel {
            FocusedPanel::Devices => {
                let Some(device) = self.devices.get(self.selected_device) else {
                    return false;
                };
                let (ok, verb) = if device.is_bonded() {
                    (device.unpair(), "Forget")
                } else {
                    (device.pair(), "Pair")
                };
                self.status = Some(format!(
                    "{} {}: {}",
                    verb,
                    device.alias(),
                    if ok { "ok" } else { "failed" }
                ));
                true
            }
            FocusedPanel::Keys => {
                let Some(device) = self.paired.get(self.selected_key) else {
                    return false;
                };
                let address = device.address().to_string();
                let alias = device.alias().to_string();
                if self.keys.toggle(&address) {
                    self.status = Some(format!("{} is now a key", alias));
                } else {
                    self.status = Some(format!("{} is no longer a key", alias));
                }
                false
            }
        }
    }

    /// Check whether the selected device is in range.
    pub fn verify_selected(&mut self) {
        let Some(mut device) = self.get_selected_device().cloned() else {
            return;
        };
        let proximity = device.verify_proximity();
        self.status = Some(format!("{} is {}", device.alias(), proximity));
    }
}

fn clamp(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bluelight_agent::bus::{BusError, Envelope, MethodCall, Transport, Value};
    use bluelight_agent::device::DeviceProperties;
    use bluelight_agent::watch::{WatchEvent, WatchHooks};
    use crossterm::event::{KeyEventState, KeyModifiers};
    use std::cell::RefCell;
    use std::os::unix::io::RawFd;
    use std::rc::Rc;

    /// Accepts every call and remembers the method names.
    #[derive(Default)]
    pub struct NullBus {
        pub methods: RefCell<Vec<String>>,
    }

    impl Transport for NullBus {
        fn call(&self, call: &MethodCall) -> Result<Vec<Value>, BusError> {
            self.methods.borrow_mut().push(call.method.clone());
            Ok(Vec::new())
        }

        fn send(&self, _call: &MethodCall) -> Result<(), BusError> {
            Ok(())
        }

        fn sync_watches(&self, _hooks: &mut dyn WatchHooks) {}

        fn handle_watch(&self, _fd: RawFd, _event: WatchEvent) {}

        fn dispatch_one(&self) -> Option<Envelope> {
            None
        }

        fn wait_for_io(&self) {}
    }

    pub fn device(bus: &Rc<NullBus>, name: &str, address: &str, bonded: bool) -> Device {
        let props = DeviceProperties {
            alias: Some(name.to_string()),
            address: Some(address.to_string()),
            bonded: Some(bonded),
            connected: Some(false),
            rssi: None,
        };
        let path = format!("/org/bluez/hci0/dev_{}", address.replace(':', "_"));
        Device::from_properties(bus.clone(), "org.bluez", &path, props)
    }

    fn sample(bus: &Rc<NullBus>) -> Vec<Device> {
        vec![
            device(bus, "Phone", "AA:AA:AA:AA:AA:AA", true),
            device(bus, "Watch", "BB:BB:BB:BB:BB:BB", true),
            device(bus, "CC-CC-CC-CC-CC-CC", "CC:CC:CC:CC:CC:CC", false),
            device(bus, "Speaker", "DD:DD:DD:DD:DD:DD", false),
        ]
    }

    #[test]
    fn test_set_devices_hides_unnamed_and_collects_paired() {
        let bus = Rc::new(NullBus::default());
        let mut app = App::new(TrustedKeys::new());
        app.set_devices(sample(&bus));

        let names: Vec<_> = app.devices.iter().map(Device::alias).collect();
        assert_eq!(names, vec!["Phone", "Watch", "Speaker"]);
        let paired: Vec<_> = app.paired.iter().map(Device::alias).collect();
        assert_eq!(paired, vec!["Phone", "Watch"]);
    }

    #[test]
    fn test_keys_of_forgotten_devices_are_dropped() {
        let bus = Rc::new(NullBus::default());
        let keys: TrustedKeys = ["AA:AA:AA:AA:AA:AA", "EE:EE:EE:EE:EE:EE"].into_iter().collect();
        let mut app = App::new(keys);

        // Nothing enumerated yet: keys survive
        app.set_devices(Vec::new());
        assert_eq!(app.keys.len(), 2);

        app.set_devices(sample(&bus));
        assert_eq!(app.keys.iter().collect::<Vec<_>>(), vec!["AA:AA:AA:AA:AA:AA"]);
    }

    #[test]
    fn test_cursor_stays_in_bounds() {
        let bus = Rc::new(NullBus::default());
        let mut app = App::new(TrustedKeys::new());
        app.set_devices(sample(&bus));

        for _ in 0..10 {
            app.next();
        }
        assert_eq!(app.selected_device, 2);

        app.set_devices(vec![device(&bus, "Phone", "AA:AA:AA:AA:AA:AA", true)]);
        assert_eq!(app.selected_device, 0);

        app.previous();
        assert_eq!(app.selected_device, 0);
    }

    #[test]
    fn test_activate_pairs_or_forgets() {
        let bus = Rc::new(NullBus::default());
        let mut app = App::new(TrustedKeys::new());
        app.set_devices(sample(&bus));

        // Bonded device: forget
        assert!(app.activate());
        app.next();
        app.next();
        // Unbonded device: pair
        assert!(app.activate());

        assert_eq!(*bus.methods.borrow(), vec!["RemoveDevice", "Pair"]);
        assert_eq!(app.status.as_deref(), Some("Pair Speaker: ok"));
    }

    #[test]
    fn test_activate_toggles_keys() {
        let bus = Rc::new(NullBus::default());
        let mut app = App::new(TrustedKeys::new());
        app.set_devices(sample(&bus));
        app.next_panel();
        app.next();

        assert!(!app.activate());
        assert!(app.keys.contains("BB:BB:BB:BB:BB:BB"));
        assert!(!app.activate());
        assert!(app.keys.is_empty());
    }

    #[test]
    fn test_verify_selected_reports_proximity() {
        let bus = Rc::new(NullBus::default());
        let mut app = App::new(TrustedKeys::new());
        app.set_devices(sample(&bus));

        app.verify_selected();
        assert_eq!(app.status.as_deref(), Some("Phone is present"));
        assert_eq!(*bus.methods.borrow(), vec!["Connect", "Disconnect"]);
    }

    fn key(code: KeyCode, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_bonded_device_without_name_stays_visible() {
        let bus = Rc::new(NullBus::default());
        let mut app = App::new(TrustedKeys::new());
        app.set_devices(vec![
            device(&bus, "NO_NAME", "AA:AA:AA:AA:AA:AA", true),
            device(&bus, "NO_NAME", "BB:BB:BB:BB:BB:BB", false),
        ]);

        let addresses: Vec<_> = app.devices.iter().map(Device::address).collect();
        assert_eq!(addresses, vec!["AA:AA:AA:AA:AA:AA"]);

        // And it can still be forgotten
        assert!(app.activate());
        assert_eq!(*bus.methods.borrow(), vec!["RemoveDevice"]);
    }

    #[test]
    fn test_only_key_presses_are_handled() {
        let bus = Rc::new(NullBus::default());
        let mut app = App::new(TrustedKeys::new());
        app.set_devices(sample(&bus));

        assert_eq!(app.handle_key(key(KeyCode::Down, KeyEventKind::Release)), KeyAction::None);
        assert_eq!(app.handle_key(key(KeyCode::Char('q'), KeyEventKind::Repeat)), KeyAction::None);
        assert_eq!(app.selected_device, 0);

        assert_eq!(app.handle_key(key(KeyCode::Down, KeyEventKind::Press)), KeyAction::None);
        assert_eq!(app.selected_device, 1);
        assert_eq!(app.handle_key(key(KeyCode::Char('r'), KeyEventKind::Press)), KeyAction::Refresh);
        assert_eq!(app.handle_key(key(KeyCode::Char('q'), KeyEventKind::Press)), KeyAction::Quit);
    }

    #[test]
    fn test_enter_on_devices_requests_refresh() {
        let bus = Rc::new(NullBus::default());
        let mut app = App::new(TrustedKeys::new());
        app.set_devices(sample(&bus));

        assert_eq!(app.handle_key(key(KeyCode::Enter, KeyEventKind::Press)), KeyAction::Refresh);
        assert_eq!(app.handle_key(key(KeyCode::Right, KeyEventKind::Press)), KeyAction::None);
        assert_eq!(app.handle_key(key(KeyCode::Enter, KeyEventKind::Press)), KeyAction::None);
        assert!(app.keys.contains("AA:AA:AA:AA:AA:AA"));
    }
}
