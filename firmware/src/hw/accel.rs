//! MPU-6050 accelerometer on the shared I2C bus.

use embedded_hal::i2c::I2c;
use sentry_core::io::{AccelerationSource, SensorError};
use sentry_core::motion::{AccelRange, AccelerationSample};

/// Address with AD0 tied low.
pub const DEFAULT_ADDRESS: u8 = 0x68;

const WHO_AM_I_VALUE: u8 = 0x68;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
enum Register {
    AccelConfig = 0x1C,
    AccelXoutH = 0x3B,
    PwrMgmt1 = 0x6B,
    WhoAmI = 0x75,
}

pub struct Mpu6050<I2C> {
    i2c: I2C,
    address: u8,
    range: AccelRange,
}

impl<I2C: I2c> Mpu6050<I2C> {
    pub fn new(i2c: I2C, address: u8, range: AccelRange) -> Self {
        Self {
            i2c,
            address,
            range,
        }
    }

    /// Checks the device identity, wakes it from sleep and selects the range.
    pub fn init(&mut self) -> Result<(), SensorError> {
        if self.read_register(Register::WhoAmI)? != WHO_AM_I_VALUE {
            return Err(SensorError::NotReady);
        }
        // Clearing SLEEP also selects the internal oscillator.
        self.write_register(Register::PwrMgmt1, 0x00)?;
        self.write_register(Register::AccelConfig, self.range.register_bits())
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_register(&mut self, reg: Register) -> Result<u8, SensorError> {
        let mut buf = [0; 1];
        self.i2c
            .write_read(self.address, &[reg as u8], &mut buf)
            .map_err(|_| SensorError::Bus)?;
        Ok(buf[0])
    }

    fn write_register(&mut self, reg: Register, value: u8) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[reg as u8, value])
            .map_err(|_| SensorError::Bus)
    }
}

impl<I2C: I2c> AccelerationSource for Mpu6050<I2C> {
    fn read_acceleration(&mut self) -> Result<AccelerationSample, SensorError> {
        let mut data = [0; 6];
        self.i2c
            .write_read(self.address, &[Register::AccelXoutH as u8], &mut data)
            .map_err(|_| SensorError::Bus)?;
        Ok(AccelerationSample::from_register_bytes(data, self.range))
    }
}
