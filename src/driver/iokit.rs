//! IOKit bindings for the graphics control user client and the PCI
//! registry. All unsafe code of the crate lives in this file.

use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{KernReturn, MuxDriver};
use crate::constants::{IO_NAME_KEY, IO_PCI_DEVICE, MODEL_KEY};
use crate::devices::{DeviceProperties, DeviceRead, DeviceRegistry};

#[allow(non_camel_case_types)]
type mach_port_t = u32;
#[allow(non_camel_case_types)]
type io_object_t = mach_port_t;
#[allow(non_camel_case_types)]
type kern_return_t = i32;

type CFTypeRef = *const c_void;
type CFAllocatorRef = *const c_void;
type CFMutableDictionaryRef = *mut c_void;
type CFTypeID = usize;
type CFIndex = isize;

// kIOMainPortDefault
const MAIN_PORT_DEFAULT: mach_port_t = 0;
const CF_STRING_ENCODING_UTF8: u32 = 0x0800_0100;

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    fn IOServiceMatching(name: *const c_char) -> CFMutableDictionaryRef;
    fn IOServiceGetMatchingServices(
        main_port: mach_port_t,
        matching: CFMutableDictionaryRef,
        existing: *mut io_object_t,
    ) -> kern_return_t;
    fn IOIteratorNext(iterator: io_object_t) -> io_object_t;
    fn IOObjectRelease(object: io_object_t) -> kern_return_t;
    fn IOServiceOpen(
        service: io_object_t,
        owning_task: mach_port_t,
        kind: u32,
        connect: *mut io_object_t,
    ) -> kern_return_t;
    fn IOServiceClose(connect: io_object_t) -> kern_return_t;
    fn IOConnectCallScalarMethod(
        connection: io_object_t,
        selector: u32,
        input: *const u64,
        input_cnt: u32,
        output: *mut u64,
        output_cnt: *mut u32,
    ) -> kern_return_t;
    fn IORegistryEntryCreateCFProperties(
        entry: io_object_t,
        properties: *mut CFMutableDictionaryRef,
        allocator: CFAllocatorRef,
        options: u32,
    ) -> kern_return_t;
}

#[link(name = "CoreFoundation", kind = "framework")]
unsafe extern "C" {
    static kCFAllocatorDefault: CFAllocatorRef;
    fn CFRelease(cf: CFTypeRef);
    fn CFGetTypeID(cf: CFTypeRef) -> CFTypeID;
    fn CFStringGetTypeID() -> CFTypeID;
    fn CFDataGetTypeID() -> CFTypeID;
    fn CFStringCreateWithCString(
        alloc: CFAllocatorRef,
        c_str: *const c_char,
        encoding: u32,
    ) -> CFTypeRef;
    fn CFStringGetCString(
        string: CFTypeRef,
        buffer: *mut c_char,
        buffer_size: CFIndex,
        encoding: u32,
    ) -> u8;
    fn CFDictionaryGetValue(dict: CFTypeRef, key: CFTypeRef) -> CFTypeRef;
    fn CFDataGetLength(data: CFTypeRef) -> CFIndex;
    fn CFDataGetBytePtr(data: CFTypeRef) -> *const u8;
}

unsafe extern "C" {
    static mach_task_self_: mach_port_t;
}

// One user client per process.
static CONNECTION_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Registry object released on drop.
#[derive(Debug)]
pub struct IoObject(io_object_t);

impl Drop for IoObject {
    fn drop(&mut self) {
        if self.0 != 0 {
            // SAFETY: we own one reference to this object.
            unsafe { IOObjectRelease(self.0) };
        }
    }
}

/// Open user-client connection (`io_connect_t`).
#[derive(Debug)]
pub struct IoConnect(io_object_t);

/// Iterate over every registry entry matching `class_name`.
fn matching_services(class_name: &str) -> Result<Vec<IoObject>, KernReturn> {
    let name = CString::new(class_name).map_err(|_| KernReturn::BAD_ARGUMENT)?;
    let mut iterator: io_object_t = 0;
    // SAFETY: IOServiceGetMatchingServices consumes the matching dictionary.
    let status = unsafe {
        let matching = IOServiceMatching(name.as_ptr());
        if matching.is_null() {
            return Err(KernReturn::NO_MEMORY);
        }
        IOServiceGetMatchingServices(MAIN_PORT_DEFAULT, matching, &mut iterator)
    };
    KernReturn(status).into_result()?;

    let iterator = IoObject(iterator);
    let mut services = Vec::new();
    loop {
        // SAFETY: iterator is a valid io_iterator_t until dropped.
        let next = unsafe { IOIteratorNext(iterator.0) };
        if next == 0 {
            break;
        }
        services.push(IoObject(next));
    }
    Ok(services)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IoKitDriver;

impl MuxDriver for IoKitDriver {
    type Service = IoObject;
    type Connection = IoConnect;

    fn matching_service(&self, class_name: &str) -> Result<Option<IoObject>, KernReturn> {
        Ok(matching_services(class_name)?.into_iter().next())
    }

    fn open_service(&self, service: IoObject) -> Result<IoConnect, KernReturn> {
        if CONNECTION_CLAIMED.swap(true, Ordering::SeqCst) {
            return Err(KernReturn::EXCLUSIVE_ACCESS);
        }
        let mut connect: io_object_t = 0;
        // SAFETY: service is a live io_service_t; connect is a valid out pointer.
        let status = unsafe { IOServiceOpen(service.0, mach_task_self_, 0, &mut connect) };
        if let Err(status) = KernReturn(status).into_result() {
            CONNECTION_CLAIMED.store(false, Ordering::SeqCst);
            return Err(status);
        }
        Ok(IoConnect(connect))
    }

    fn call_scalar_method(
        &self,
        connection: &IoConnect,
        selector: u32,
        input: &[u64],
        output: &mut [u64],
    ) -> Result<usize, KernReturn> {
        let mut output_cnt = output.len() as u32;
        let input_ptr = if input.is_empty() {
            std::ptr::null()
        } else {
            input.as_ptr()
        };
        let (output_ptr, output_cnt_ptr) = if output.is_empty() {
            (std::ptr::null_mut(), std::ptr::null_mut())
        } else {
            (output.as_mut_ptr(), &mut output_cnt as *mut u32)
        };
        // SAFETY: pointers are either null with a zero count or point to
        // buffers of the advertised length.
        let status = unsafe {
            IOConnectCallScalarMethod(
                connection.0,
                selector,
                input_ptr,
                input.len() as u32,
                output_ptr,
                output_cnt_ptr,
            )
        };
        KernReturn(status).into_result()?;
        Ok(if output.is_empty() { 0 } else { output_cnt as usize })
    }

    fn close_service(&self, connection: &IoConnect) -> Result<(), KernReturn> {
        // SAFETY: connection came from IOServiceOpen and is still open.
        let status = unsafe { IOServiceClose(connection.0) };
        KernReturn(status).into_result()?;
        CONNECTION_CLAIMED.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Owned CoreFoundation object.
struct CfOwned(CFTypeRef);

impl Drop for CfOwned {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: we hold the +1 reference returned by a Create call.
            unsafe { CFRelease(self.0) };
        }
    }
}

fn cf_string(value: &str) -> Option<CfOwned> {
    let value = CString::new(value).ok()?;
    // SAFETY: value is a valid NUL-terminated UTF-8 string.
    let string = unsafe {
        CFStringCreateWithCString(
            kCFAllocatorDefault,
            value.as_ptr(),
            CF_STRING_ENCODING_UTF8,
        )
    };
    (!string.is_null()).then_some(CfOwned(string))
}

/// Borrowed lookup in a properties dictionary.
fn dictionary_value(dict: &CfOwned, key: &str) -> Option<CFTypeRef> {
    let key = cf_string(key)?;
    // SAFETY: both arguments are live CF objects; the result is borrowed.
    let value = unsafe { CFDictionaryGetValue(dict.0, key.0) };
    (!value.is_null()).then_some(value)
}

fn string_value(value: CFTypeRef) -> Option<String> {
    // SAFETY: value is a live CF object borrowed from its dictionary.
    unsafe {
        if CFGetTypeID(value) != CFStringGetTypeID() {
            return None;
        }
        let mut buffer = [0 as c_char; 256];
        if CFStringGetCString(
            value,
            buffer.as_mut_ptr(),
            buffer.len() as CFIndex,
            CF_STRING_ENCODING_UTF8,
        ) == 0
        {
            return None;
        }
        let value = CStr::from_ptr(buffer.as_ptr());
        Some(value.to_string_lossy().into_owned())
    }
}

fn data_value(value: CFTypeRef) -> Option<Vec<u8>> {
    // SAFETY: value is a live CF object borrowed from its dictionary.
    unsafe {
        if CFGetTypeID(value) != CFDataGetTypeID() {
            return None;
        }
        let len = usize::try_from(CFDataGetLength(value)).ok()?;
        let ptr = CFDataGetBytePtr(value);
        if ptr.is_null() {
            return Some(Vec::new());
        }
        Some(std::slice::from_raw_parts(ptr, len).to_vec())
    }
}

fn device_properties(device: &IoObject) -> DeviceRead {
    let mut dict: CFMutableDictionaryRef = std::ptr::null_mut();
    // SAFETY: device is a live registry entry; dict is a valid out pointer.
    let status =
        unsafe { IORegistryEntryCreateCFProperties(device.0, &mut dict, kCFAllocatorDefault, 0) };
    KernReturn(status).into_result()?;
    if dict.is_null() {
        return Err(KernReturn::ERROR);
    }
    let dict = CfOwned(dict);

    Ok(DeviceProperties {
        name: dictionary_value(&dict, IO_NAME_KEY).and_then(string_value),
        model: dictionary_value(&dict, MODEL_KEY).and_then(data_value),
    })
}

/// PCI device registry backed by `IOPCIDevice` matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct IoKitRegistry;

impl DeviceRegistry for IoKitRegistry {
    fn pci_devices(&self) -> Result<Vec<DeviceRead>, KernReturn> {
        Ok(matching_services(IO_PCI_DEVICE)?
            .iter()
            .map(device_properties)
            .collect())
    }
}
