//! End-to-End-Szenarien des Importers gegen das In-Memory-Modul.
//!
//! Alle Läufe benutzen das KJV-Schema. Die Wohlgeformtheit der
//! geschriebenen Einträge wird mit quick-xml gegengeprüft.

use std::rc::Rc;

use rosis::v11n::System;
use rosis::{
    import, DebugFlags, ImportOptions, MemModule, Reporter, TextFilter, TextModule, VerseKey,
};

const WRAP_HEAD: &str =
    "<osis><osisText osisIDWork=\"test\"><header><work osisWork=\"test\"></work></header>";
const WRAP_TAIL: &str = "</osisText></osis>";

fn run(osis: &str) -> Box<dyn TextModule> {
    run_with(osis, ImportOptions::default()).0
}

fn run_with(osis: &str, opts: ImportOptions) -> (Box<dyn TextModule>, rosis::ImportStats) {
    let system = Rc::new(System::kjv());
    let module = Box::new(MemModule::new(system));
    let reporter = Reporter::with_writer(DebugFlags::none(), Box::new(Vec::new()));
    import(opts, module, reporter, std::io::Cursor::new(osis.as_bytes())).unwrap()
}

fn entry(m: &mut Box<dyn TextModule>, osis_ref: &str) -> Option<Vec<u8>> {
    let k = VerseKey::from_osis(m.system().clone(), osis_ref).unwrap();
    if !m.has_entry(&k) {
        return None;
    }
    m.set_key(&k);
    Some(m.raw_entry().unwrap())
}

fn entry_str(m: &mut Box<dyn TextModule>, osis_ref: &str) -> Option<String> {
    entry(m, osis_ref).map(|b| String::from_utf8_lossy(&b).into_owned())
}

/// Jeder Eintrag muss für sich wohlgeformtes XML sein (in einen
/// Wurzelknoten gewickelt, da Einträge Fragmente sind).
fn assert_well_formed(entry: &str) {
    let wrapped = format!("<entry>{entry}</entry>");
    let mut reader = quick_xml::Reader::from_str(&wrapped);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Eof) => break,
            Ok(_) => {}
            Err(e) => panic!("entry is not well-formed: {e}\n{entry}"),
        }
    }
}

/// Szenario 1: ein Buch, ein Kapitel, ein Vers.
#[test]
fn scenario_single_verse_with_revision_milestone() {
    let mut m = run(
        "<osis><osisText><header></header>\
         <div type=\"book\" osisID=\"Gen\" sID=\"g\"/>\
         <chapter osisID=\"Gen.1\" sID=\"gc\"/>\
         <verse osisID=\"Gen.1.1\" sID=\"gv\"/>In the beginning.<verse eID=\"gv\"/>\
         <chapter eID=\"gc\"/><div eID=\"g\"/></osisText></osis>",
    );

    let e = entry_str(&mut m, "Gen.1.1").unwrap();
    assert!(e.starts_with("In the beginning."), "{e}");
    assert_well_formed(&e);

    // der Revisions-Milestone steht vor dem ersten Inhalt (Modul-Intro)
    let intro_key = VerseKey::new(m.system().clone());
    m.set_key(&intro_key);
    let intro = String::from_utf8_lossy(&m.raw_entry().unwrap()).into_owned();
    assert!(intro.contains("type=\"x-importer\""), "{intro}");
    assert!(intro.contains("subType=\"x-osis2mod\""), "{intro}");
    // genau einmal im gesamten Modul
    let all = format!("{intro}{e}");
    assert_eq!(all.matches("x-importer").count(), 1);
}

/// Szenario 2: Matt.7.30 liegt hinter dem letzten KJV-Vers des Kapitels
/// und wird mit genau einem Blank an Matt.7.29 angehängt.
#[test]
fn scenario_verse_past_chapter_end_appends() {
    let mut m = run(&format!(
        "{WRAP_HEAD}<div type=\"book\" osisID=\"Matt\" sID=\"b\"/>\
         <chapter osisID=\"Matt.7\" sID=\"c\"/>\
         <verse osisID=\"Matt.7.29\">A</verse>\
         <verse osisID=\"Matt.7.30\">B</verse>{WRAP_TAIL}"
    ));
    let e = entry_str(&mut m, "Matt.7.29").unwrap();
    assert_eq!(e, "A B");
    assert!(entry(&mut m, "Matt.7.30").is_none());
}

/// Kapitel über dem Buchmaximum: Inhalt landet im letzten Vers des
/// letzten Kapitels.
#[test]
fn scenario_chapter_past_book_end_appends_to_last_chapter() {
    let mut m = run(&format!(
        "{WRAP_HEAD}<div type=\"book\" osisID=\"Mal\" sID=\"b\"/>\
         <chapter osisID=\"Mal.4\" sID=\"c\"/>\
         <verse osisID=\"Mal.4.6\">last</verse>\
         <verse osisID=\"Mal.5.1\">extra</verse>{WRAP_TAIL}"
    ));
    let e = entry_str(&mut m, "Mal.4.6").unwrap();
    assert_eq!(e, "last extra");
}

/// Szenario 3: Mehrvers-osisID schreibt auf den ersten Vers; der Rest
/// wird im Link-Pass verlinkt; der folgende überzählige Vers hängt sich
/// an den Schreib-Vers an.
#[test]
fn scenario_multi_verse_osis_id_links_and_reversifies() {
    let mut m = run(&format!(
        "{WRAP_HEAD}<div type=\"book\" osisID=\"Gen\" sID=\"b\"/>\
         <chapter osisID=\"Gen.1\" sID=\"c\"/>\
         <verse osisID=\"Gen.1.29 Gen.1.30 Gen.1.31\">X</verse>\
         <verse osisID=\"Gen.1.32\">Y</verse>{WRAP_TAIL}"
    ));
    assert_eq!(entry_str(&mut m, "Gen.1.29").unwrap(), "X Y");
    // Links zeigen auf den ersten Vers des Sets
    assert_eq!(entry_str(&mut m, "Gen.1.30").unwrap(), "X Y");
    assert_eq!(entry_str(&mut m, "Gen.1.31").unwrap(), "X Y");
}

/// Szenario 4: WOC über die Versgrenze — jeder Eintrag schließt sein
/// eigenes `<q who="Jesus" marker="">`.
#[test]
fn scenario_woc_crosses_verse_boundary() {
    let mut m = run(&format!(
        "{WRAP_HEAD}<div type=\"book\" osisID=\"Matt\" sID=\"b\"/>\
         <chapter osisID=\"Matt.5\" sID=\"c\"/>\
         <verse osisID=\"Matt.5.3\" sID=\"v1\"/>\
         <q who=\"Jesus\" sID=\"j1\"/>He said <verse eID=\"v1\"/>\
         <verse osisID=\"Matt.5.4\" sID=\"v2\"/>blessed<q who=\"Jesus\" eID=\"j1\"/>\
         <verse eID=\"v2\"/>{WRAP_TAIL}"
    ));

    let v3 = entry_str(&mut m, "Matt.5.3").unwrap();
    assert!(v3.ends_with("</q>"), "{v3}");
    let v4 = entry_str(&mut m, "Matt.5.4").unwrap();
    assert!(v4.starts_with("<q who=\"Jesus\" marker=\"\">"), "{v4}");
    assert!(v4.contains("</q>"), "{v4}");

    // WOC-Klammern sind je Eintrag ausgeglichen
    for e in [&v3, &v4] {
        assert_eq!(
            e.matches("<q who=\"Jesus\" marker=\"\">").count(),
            e.matches("</q>").count(),
            "{e}"
        );
        assert_well_formed(e);
    }
}

/// Szenario 5: Entity-Behandlung im Verstext.
#[test]
fn scenario_entities_in_verse_text() {
    let mut m = run(&format!(
        "{WRAP_HEAD}<div type=\"book\" osisID=\"Gen\" sID=\"b\"/>\
         <chapter osisID=\"Gen.1\" sID=\"c\"/>\
         <verse osisID=\"Gen.1.1\">&#38; &#60; &#65; &#x10FFFF; &bogus;</verse>{WRAP_TAIL}"
    ));
    let e = entry_str(&mut m, "Gen.1.1").unwrap();
    assert!(e.contains("&amp;"), "{e}");
    assert!(e.contains("&lt;"), "{e}");
    assert!(e.contains("A"), "{e}");
    assert!(e.contains('\u{10FFFF}'), "{e}");
    assert!(e.contains("&bogus;"), "{e}");
}

/// Szenario 6: Kommentare hinterlassen kein Byte in den Einträgen.
#[test]
fn scenario_comments_leave_no_bytes() {
    let mut m = run(&format!(
        "{WRAP_HEAD}<div type=\"book\" osisID=\"Gen\" sID=\"b\"/>\
         <chapter osisID=\"Gen.1\" sID=\"c\"/>\
         <verse osisID=\"Gen.1.1\">first</verse>\
         <!-- aside\nwith lines -->\
         <verse osisID=\"Gen.1.2\">second</verse>{WRAP_TAIL}"
    ));
    let e1 = entry_str(&mut m, "Gen.1.1").unwrap();
    let e2 = entry_str(&mut m, "Gen.1.2").unwrap();
    assert!(!e1.contains("aside") && !e2.contains("aside"), "{e1} / {e2}");
    assert!(e1.starts_with("first"), "{e1}");
    assert!(e2.starts_with("second"), "{e2}");
}

/// Jeder geschriebene Eintrag hat einen gültigen Schlüssel im Schema —
/// hier indirekt: alle abgefragten Einträge liegen auf gültigen Ordinalen,
/// und der überzählige Vers hat keinen eigenen Eintrag bekommen.
#[test]
fn no_entries_outside_the_versification() {
    let mut m = run(&format!(
        "{WRAP_HEAD}<div type=\"book\" osisID=\"Matt\" sID=\"b\"/>\
         <chapter osisID=\"Matt.7\" sID=\"c\"/>\
         <verse osisID=\"Matt.7.28\">a</verse>\
         <verse osisID=\"Matt.7.29\">b</verse>\
         <verse osisID=\"Matt.7.30\">c</verse>{WRAP_TAIL}"
    ));
    assert!(entry(&mut m, "Matt.7.30").is_none());
    assert_eq!(entry_str(&mut m, "Matt.7.29").unwrap(), "b c");
    assert_eq!(entry_str(&mut m, "Matt.7.28").unwrap(), "a");
}

/// Buch-, Kapitel- und Modul-Intros landen auf ihren Intro-Slots.
#[test]
fn intro_material_lands_on_intro_slots() {
    let mut m = run(&format!(
        "{WRAP_HEAD}\
         <div type=\"x-about\">This module is a test.</div>\
         <div type=\"book\" osisID=\"Gen\" sID=\"b\"/>\
         <title type=\"main\">The First Book of Moses</title>\
         <chapter osisID=\"Gen.1\" sID=\"c\"/>\
         <title type=\"chapter\">Chapter 1</title>\
         <verse osisID=\"Gen.1.1\">In the beginning.</verse>{WRAP_TAIL}"
    ));

    let sys = m.system().clone();

    // Modul-Intro (mit Revisions-Milestone)
    let module_intro = VerseKey::new(sys.clone());
    m.set_key(&module_intro);
    let intro = String::from_utf8_lossy(&m.raw_entry().unwrap()).into_owned();
    assert!(intro.contains("This module is a test."), "{intro}");

    // Buch-Intro
    let e = entry_str(&mut m, "Gen").unwrap();
    assert!(e.contains("The First Book of Moses"), "{e}");

    // Kapitel-Intro
    let e = entry_str(&mut m, "Gen.1").unwrap();
    assert!(e.contains("Chapter 1"), "{e}");

    let e = entry_str(&mut m, "Gen.1.1").unwrap();
    assert!(e.starts_with("In the beginning."), "{e}");
}

/// Absätze über Versgrenzen hinweg: jeder Eintrag bleibt wohlgeformt,
/// die x-p-Milestones tragen paarige IDs.
#[test]
fn paragraph_across_verses_stays_well_formed() {
    let mut m = run(&format!(
        "{WRAP_HEAD}<div type=\"book\" osisID=\"Gen\" sID=\"b\"/>\
         <chapter osisID=\"Gen.1\" sID=\"c\"/>\
         <verse osisID=\"Gen.1.1\" sID=\"v1\"/>one<p>para start<verse eID=\"v1\"/>\
         <verse osisID=\"Gen.1.2\" sID=\"v2\"/>para end</p>two<verse eID=\"v2\"/>{WRAP_TAIL}"
    ));
    let e1 = entry_str(&mut m, "Gen.1.1").unwrap();
    let e2 = entry_str(&mut m, "Gen.1.2").unwrap();
    assert!(e1.contains("<div type=\"x-p\" sID=\"gen1\"/>"), "{e1}");
    assert!(e2.contains("<div type=\"x-p\" eID=\"gen1\"/>"), "{e2}");
    assert_well_formed(&e1);
    assert_well_formed(&e2);
}

/// Nicht-UTF-8-Eingabe wird als cp1252 interpretiert und zu UTF-8
/// konvertiert; der Zähler meldet die Konversion.
#[test]
fn latin1_input_is_converted_when_normalizing() {
    let system = Rc::new(System::kjv());
    let module = Box::new(MemModule::new(system));
    let reporter = Reporter::with_writer(DebugFlags::none(), Box::new(Vec::new()));
    let mut osis: Vec<u8> = Vec::new();
    osis.extend_from_slice(WRAP_HEAD.as_bytes());
    osis.extend_from_slice(
        b"<div type=\"book\" osisID=\"Gen\" sID=\"b\"/>\
          <chapter osisID=\"Gen.1\" sID=\"c\"/>\
          <verse osisID=\"Gen.1.1\">caf\xE9</verse>",
    );
    osis.extend_from_slice(WRAP_TAIL.as_bytes());

    let (mut m, stats) = import(
        ImportOptions::default(),
        module,
        reporter,
        std::io::Cursor::new(osis),
    )
    .unwrap();

    assert!(stats.converted >= 1);
    let e = entry_str(&mut m, "Gen.1.1").unwrap();
    assert!(e.contains("café"), "{e}");
}

/// `-N`: Nicht-UTF-8 bleibt unangetastet (nur Warnung).
#[test]
fn latin1_input_is_kept_without_normalization() {
    let system = Rc::new(System::kjv());
    let module = Box::new(MemModule::new(system));
    let reporter = Reporter::with_writer(DebugFlags::none(), Box::new(Vec::new()));
    let mut osis: Vec<u8> = Vec::new();
    osis.extend_from_slice(WRAP_HEAD.as_bytes());
    osis.extend_from_slice(
        b"<div type=\"book\" osisID=\"Gen\" sID=\"b\"/>\
          <chapter osisID=\"Gen.1\" sID=\"c\"/>\
          <verse osisID=\"Gen.1.1\">caf\xE9</verse>",
    );
    osis.extend_from_slice(WRAP_TAIL.as_bytes());

    let opts = ImportOptions {
        normalize: false,
        ..ImportOptions::default()
    };
    let (mut m, stats) = import(opts, module, reporter, std::io::Cursor::new(osis)).unwrap();

    assert_eq!(stats.converted, 0);
    let e = entry(&mut m, "Gen.1.1").unwrap();
    assert!(e.contains(&0xE9), "{e:?}");
}

/// UTF-16-Speicherencoding: Einträge liegen als UTF-16LE mit BOM im Modul,
/// Anhänge-Pfade decodieren vor dem Zusammenfügen.
#[test]
fn utf16_output_encoding_round_trips_appends() {
    let opts = ImportOptions {
        encoding: rosis::OutputEncoding::Utf16,
        ..ImportOptions::default()
    };
    let (mut m, _stats) = run_with(
        &format!(
            "{WRAP_HEAD}<div type=\"book\" osisID=\"Matt\" sID=\"b\"/>\
             <chapter osisID=\"Matt.7\" sID=\"c\"/>\
             <verse osisID=\"Matt.7.29\">A</verse>\
             <verse osisID=\"Matt.7.30\">B</verse>{WRAP_TAIL}"
        ),
        opts,
    );
    let raw = entry(&mut m, "Matt.7.29").unwrap();
    assert_eq!(&raw[..2], &[0xFF, 0xFE]);
    let mut buf = raw;
    rosis::filter::Utf16Utf8
        .process(&mut buf, None)
        .unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "A B");
}

/// Mehrfach-Flush auf denselben Schlüssel passiert nur als Anhängen —
/// zweimal derselbe Vers erzeugt einen zusammengefügten Eintrag.
#[test]
fn duplicate_verse_appends_instead_of_overwriting() {
    let mut m = run(&format!(
        "{WRAP_HEAD}<div type=\"book\" osisID=\"Gen\" sID=\"b\"/>\
         <chapter osisID=\"Gen.1\" sID=\"c\"/>\
         <verse osisID=\"Gen.1.1\">alpha</verse>\
         <verse osisID=\"Gen.1.2\">beta</verse>\
         <verse osisID=\"Gen.1.1\">gamma</verse>{WRAP_TAIL}"
    ));
    let e = entry_str(&mut m, "Gen.1.1").unwrap();
    assert_eq!(e, "alpha gamma");
}
