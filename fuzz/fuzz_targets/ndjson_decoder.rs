#![no_main]

use libfuzzer_sys::fuzz_target;
use replitrace::decoder::MessageDecoder;
use replitrace::event_stream::{EventStream, NdjsonEventStream};
use replitrace::messages::Message;
use replitrace::string_arena::SharedArena;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must surface as errors or skipped events, never panics
    let Ok(mut stream) = NdjsonEventStream::new(data) else {
        return;
    };
    let mut decoder = MessageDecoder::new(SharedArena::new());
    let mut sink: Vec<Message> = Vec::new();
    while let Ok(Some(event)) = stream.next_event() {
        let local_seconds = stream.cycles_to_seconds(event.cycle);
        decoder.decode(&event, local_seconds, &mut sink);
    }
});
