use std::collections::HashMap;
use std::io::{self, Write};

use log::debug;

/// keyboard controller data port
pub const KEYBOARD_DATA: u16 = 0x60;
/// serial adapter data port
pub const SERIAL_DATA: u16 = 0x3F8;

pub type InputHandler = Box<dyn FnMut(u16) -> u8>;
pub type OutputHandler = Box<dyn FnMut(u16, u8)>;

/// the I/O port space: a pair of handler maps plus a latch of last
/// written values. unmapped ports read as zero and swallow writes
pub struct IoBus {
    input_handlers: HashMap<u16, InputHandler>,
    output_handlers: HashMap<u16, OutputHandler>,
    port_values: HashMap<u16, u8>,
}

impl IoBus {
    /// a bus with the default handler set: keyboard data reads zero,
    /// serial data writes to standard output
    pub fn default_handlers() -> Self {
        let mut bus = IoBus::empty();
        bus.register_in(KEYBOARD_DATA, Box::new(|_| 0));
        bus.register_out(
            SERIAL_DATA,
            Box::new(|_, value| {
                print!("{}", value as char);
                let _ = io::stdout().flush();
            }),
        );
        bus
    }

    pub fn empty() -> Self {
        IoBus {
            input_handlers: HashMap::new(),
            output_handlers: HashMap::new(),
            port_values: HashMap::new(),
        }
    }

    pub fn register_in(&mut self, port: u16, handler: InputHandler) {
        self.input_handlers.insert(port, handler);
    }

    pub fn register_out(&mut self, port: u16, handler: OutputHandler) {
        self.output_handlers.insert(port, handler);
    }

    /// read byte from I/O port
    pub fn in_u8(&mut self, port: u16) -> u8 {
        if let Some(handler) = self.input_handlers.get_mut(&port) {
            return handler(port);
        }
        match self.port_values.get(&port) {
            Some(v) => *v,
            None => {
                debug!("in_u8: unhandled port {:04X}", port);
                0
            }
        }
    }

    /// write byte to I/O port. the value is latched so it reads back
    pub fn out_u8(&mut self, port: u16, data: u8) {
        self.port_values.insert(port, data);
        if let Some(handler) = self.output_handlers.get_mut(&port) {
            handler(port, data);
        } else {
            debug!("out_u8: unhandled port {:04X} = {:02X}", port, data);
        }
    }

    /// word read: low byte from `port`, high byte from `port + 1`
    pub fn in_u16(&mut self, port: u16) -> u16 {
        u16::from(self.in_u8(port)) | u16::from(self.in_u8(port.wrapping_add(1))) << 8
    }

    /// word write: low byte to `port`, high byte to `port + 1`
    pub fn out_u16(&mut self, port: u16, data: u16) {
        self.out_u8(port, (data & 0xFF) as u8);
        self.out_u8(port.wrapping_add(1), (data >> 8) as u8);
    }
}
