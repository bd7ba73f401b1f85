//! A generic driver for the Serial Camera Control Bus on the OV7692 image sensor. Works with
//! any I2C master implementing the embedded-hal blocking `Read` and `Write` traits.

use core::marker::PhantomData;
use embedded_hal::blocking::i2c;
use heapless::LinearMap;

use crate::error::SensorFault;

/// Statically allocated (size 64) linear map for mapping addresses (`u8`) to values (`u8`).
pub type RegMap = LinearMap<u8, u8, 64>;

/// SCCB driver.
pub struct Sccb<I2C> {
    /// Marker to ensure the same I2C type is used in all calls.
    i2c: PhantomData<I2C>,
    /// Device I2C address.
    address: u8,
}

/// SCCB errors.
#[derive(Debug, Eq, PartialEq)]
pub enum SccbError<E> {
    /// I2C write error.
    I2cWrite(E),
    /// I2C read error.
    I2cRead(E),
    /// Manufacturer ID mismatch.
    ReadManfId,
    /// Product ID mismatch.
    ReadProdId,
    /// Register write-readback mismatch.
    RegMismatch((u8, u8)),
}

impl<E> From<SccbError<E>> for SensorFault {
    fn from(err: SccbError<E>) -> Self {
        match err {
            SccbError::I2cWrite(_) | SccbError::I2cRead(_) => SensorFault::Bus,
            SccbError::ReadManfId => SensorFault::ManufacturerId,
            SccbError::ReadProdId => SensorFault::ProductId,
            SccbError::RegMismatch((reg, val)) => SensorFault::RegMismatch(reg, val),
        }
    }
}

impl<I2C, E> Sccb<I2C>
where
    I2C: i2c::Read<Error = E> + i2c::Write<Error = E>,
{
    /// Creates a new SCCB driver associated with an I2C peripheral.
    pub fn new(_i2c: &I2C) -> Self {
        Sccb {
            i2c: PhantomData,
            address: OV7692_ADDRESS,
        }
    }

    /// I2C read wrapper for mapping `E --> SccbError`.
    fn i2c_read(&self, i2c: &mut I2C, buf: &mut [u8]) -> Result<(), SccbError<E>> {
        i2c.read(self.address, buf).map_err(SccbError::I2cRead)
    }

    /// I2C write wrapper for mapping `E --> SccbError`.
    fn i2c_write(&self, i2c: &mut I2C, buf: &[u8]) -> Result<(), SccbError<E>> {
        i2c.write(self.address, buf).map_err(SccbError::I2cWrite)
    }

    /// Read a register, must be two seperate transactions and we can't use `WriteRead`.
    pub fn read_register(&self, i2c: &mut I2C, reg: u8) -> Result<u8, SccbError<E>> {
        self.i2c_write(i2c, &[reg])?;

        let mut buf = [0x00];
        self.i2c_read(i2c, &mut buf)?;

        Ok(buf[0])
    }

    /// Write a register.
    pub fn write_register(&self, i2c: &mut I2C, reg: u8, val: u8) -> Result<(), SccbError<E>> {
        self.i2c_write(i2c, &[reg, val])
    }

    /// Check the device ID matches the expected value.
    pub fn check_id(&self, i2c: &mut I2C) -> Result<(), SccbError<E>> {
        let manf_id_msb: u16 = self.read_register(i2c, Register::MANF_ID_MSB)?.into();
        let manf_id_lsb: u16 = self.read_register(i2c, Register::MANF_ID_LSB)?.into();
        if (manf_id_msb << 8) | manf_id_lsb != OV7692_MANF_ID {
            return Err(SccbError::ReadManfId);
        }

        let product_id_msb: u16 = self.read_register(i2c, Register::PROD_ID_MSB)?.into();
        let product_id_lsb: u16 = self.read_register(i2c, Register::PROD_ID_LSB)?.into();
        if (product_id_msb << 8) | product_id_lsb != OV7692_PROD_ID {
            return Err(SccbError::ReadProdId);
        }

        Ok(())
    }

    /// Apply a register configuration specified by the linear map.
    pub fn apply_config(
        &self,
        i2c: &mut I2C,
        map: &RegMap,
        do_readback: bool,
    ) -> Result<(), SccbError<E>> {
        for (reg, val) in map.iter() {
            self.write_register(i2c, *reg, *val)?;

            if do_readback {
                let readback = self.read_register(i2c, *reg)?;
                if readback != *val {
                    return Err(SccbError::RegMismatch((*reg, readback)));
                }
            }
        }

        Ok(())
    }
}

/// Device address is 0x78, however the I2C driver will left-shift the provided address by 1
const OV7692_ADDRESS: u8 = 0x3C;

/// Expected manufacturer ID, same as every OmniVision part
const OV7692_MANF_ID: u16 = 0x7FA2;

/// Expected product ID
const OV7692_PROD_ID: u16 = 0x7692;

/// Device register addresses.
pub struct Register;

impl Register {
    // Product ID registers
    pub const PROD_ID_MSB: u8 = 0x0A;
    pub const PROD_ID_LSB: u8 = 0x0B;

    // Clock prescaler, 0x00 runs the pixel clock straight off XCLK
    pub const CLK_RC: u8 = 0x11;

    // Manufacturer ID registers
    pub const MANF_ID_MSB: u8 = 0x1C;
    pub const MANF_ID_LSB: u8 = 0x1D;
}
