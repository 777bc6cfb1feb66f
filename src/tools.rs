use std::fs::File;
use std::io::{Error, Read, Write};

pub fn read_binary(path: &str) -> Result<Vec<u8>, Error> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut f = File::open(path)?;
    f.read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn read_text(path: &str) -> Result<String, Error> {
    let mut buffer = String::new();
    let mut f = File::open(path)?;
    f.read_to_string(&mut buffer)?;
    Ok(buffer)
}

pub fn write_binary(path: &str, data: &[u8]) -> Result<(), Error> {
    let mut f = File::create(path)?;
    f.write_all(data)
}
