#![no_main]
use libfuzzer_sys::fuzz_target;

use std::rc::Rc;

use rosis::key::{parse_verse_list, prepare_osis_ref, VerseKey};
use rosis::v11n::System;
use rosis::{DebugFlags, Reporter};

fuzz_target!(|data: &[u8]| {
    // osisRef-Vorbereitung und Listen-Parsing über beliebige Strings.
    if let Ok(s) = std::str::from_utf8(data) {
        let mut reporter =
            Reporter::with_writer(DebugFlags::none(), Box::new(std::io::sink()));
        let mut buf = s.to_string();
        prepare_osis_ref(&mut buf, &mut reporter);

        let system = Rc::new(System::kjv());
        let ctx = VerseKey::new(system.clone());
        let mut list = parse_verse_list(&system, &buf, &ctx);
        list.set_top();
        while list.element().is_some() && !list.pop_error() {
            list.increment();
        }
    }
});
