#![no_main]
use libfuzzer_sys::fuzz_target;

use std::rc::Rc;

use rosis::v11n::System;
use rosis::{import, DebugFlags, ImportOptions, MemModule, Reporter};

fuzz_target!(|data: &[u8]| {
    // Der komplette Import-Pfad über beliebige Bytes: Scanner, Transformer
    // und State-Machine dürfen nur über Result-Fehler aussteigen.
    let system = Rc::new(System::kjv());
    let module = Box::new(MemModule::new(system));
    let reporter = Reporter::with_writer(DebugFlags::none(), Box::new(std::io::sink()));
    let _ = import(
        ImportOptions::default(),
        module,
        reporter,
        std::io::Cursor::new(data),
    );
});
