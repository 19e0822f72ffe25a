use cocoa::appkit::NSPasteboardTypeString;
use cocoa::base::{id, nil};
use cocoa::foundation::{NSAutoreleasePool, NSString};
use objc::{class, msg_send, sel, sel_impl};
use std::ffi::CStr;

/// `[[NSPasteboard generalPasteboard] changeCount]`
pub fn change_count() -> u64 {
    unsafe {
        let pasteboard: id = msg_send![class!(NSPasteboard), generalPasteboard];
        let count: i64 = msg_send![pasteboard, changeCount];
        count.max(0) as u64
    }
}

/// Plain-text flavour of the general pasteboard, `None` for non-text content
pub fn read_string() -> Option<String> {
    unsafe {
        // Called from worker threads that have no autorelease pool of their own
        let pool = NSAutoreleasePool::new(nil);

        let pasteboard: id = msg_send![class!(NSPasteboard), generalPasteboard];
        let value: id = msg_send![pasteboard, stringForType: NSPasteboardTypeString];

        let text = if value == nil {
            None
        } else {
            let ptr = NSString::UTF8String(value);
            if ptr.is_null() {
                None
            } else {
                Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        };

        pool.drain();
        text
    }
}
