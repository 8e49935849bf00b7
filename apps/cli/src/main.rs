use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{EnquiryForm, EnquiryTarget, FilterKey, Listings, MarketplaceClient};
use shared::{
    domain::{Act, ActId, ListingKind, Venue, VenueId},
    protocol::ProviderRegistration,
};

#[derive(Parser, Debug)]
#[command(name = "bookedup", about = "Browse listings and send booking enquiries")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search act listings.
    Acts {
        #[arg(long, default_value = "")]
        q: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        act_type: String,
        #[arg(long, default_value = "")]
        genre: String,
    },
    /// Search venue listings.
    Venues {
        #[arg(long, default_value = "")]
        q: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        style: String,
    },
    /// Show one act with its reviews.
    Act { slug: String },
    /// Show one venue with its reviews.
    Venue { slug: String },
    /// Show the featured carousels.
    Featured,
    /// Send a booking enquiry for an act or a venue.
    Enquire {
        #[arg(long)]
        act_id: Option<i64>,
        #[arg(long)]
        venue_id: Option<i64>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: String,
        #[arg(long, default_value = "")]
        message: String,
    },
    /// Register a provider account and print the issued token.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        display_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let client = MarketplaceClient::new(args.server_url);

    match args.command {
        Command::Acts {
            q,
            location,
            act_type,
            genre,
        } => {
            let browser = client.browser(ListingKind::Acts);
            browser.set_filter(FilterKey::Text, q).await?;
            browser.set_filter(FilterKey::Location, location).await?;
            browser.set_filter(FilterKey::ActType, act_type).await?;
            browser.set_filter(FilterKey::Genre, genre).await?;
            browser.refresh().await?;
            print_listings(&browser.results().await);
        }
        Command::Venues { q, location, style } => {
            let browser = client.browser(ListingKind::Venues);
            browser.set_filter(FilterKey::Text, q).await?;
            browser.set_filter(FilterKey::Location, location).await?;
            browser.set_filter(FilterKey::Style, style).await?;
            browser.refresh().await?;
            print_listings(&browser.results().await);
        }
        Command::Act { slug } => {
            let detail = client.load_act_detail(&slug).await?;
            print_act(&detail.act);
            if let Some(description) = &detail.act.description {
                println!("  {description}");
            }
            println!("Reviews ({}):", detail.reviews.len());
            for review in &detail.reviews {
                println!("  {}/5 {}: {}", review.rating, review.author_name, review.comment);
            }
        }
        Command::Venue { slug } => {
            let detail = client.load_venue_detail(&slug).await?;
            print_venue(&detail.venue);
            println!("Reviews ({}):", detail.reviews.len());
            for review in &detail.reviews {
                println!("  {}/5 {}: {}", review.rating, review.author_name, review.comment);
            }
        }
        Command::Featured => {
            println!("Featured acts:");
            for act in client.featured_acts().await? {
                print_act(&act);
            }
            println!("Featured venues:");
            for venue in client.featured_venues().await? {
                print_venue(&venue);
            }
        }
        Command::Enquire {
            act_id,
            venue_id,
            name,
            email,
            date,
            message,
        } => {
            let target = match (act_id, venue_id) {
                (Some(id), None) => EnquiryTarget::Act(ActId(id)),
                (None, Some(id)) => EnquiryTarget::Venue(VenueId(id)),
                _ => bail!("pass exactly one of --act-id / --venue-id"),
            };
            let mut form = EnquiryForm {
                customer_name: name,
                customer_email: email,
                date,
                message,
            };
            let ack = client.submit_enquiry(&mut form, target).await?;
            println!("Enquiry sent, booking id {}", ack.id.0);
        }
        Command::Register {
            email,
            password,
            display_name,
        } => {
            let token = client
                .register_provider(&ProviderRegistration {
                    email,
                    password,
                    display_name,
                })
                .await?;
            println!("Registered. Access token: {}", token.access_token);
        }
    }

    Ok(())
}

fn print_listings(listings: &Listings) {
    match listings {
        Listings::Acts(acts) => {
            println!("{} act(s):", acts.len());
            for act in acts {
                print_act(act);
            }
        }
        Listings::Venues(venues) => {
            println!("{} venue(s):", venues.len());
            for venue in venues {
                print_venue(venue);
            }
        }
    }
}

fn print_act(act: &Act) {
    let price = act
        .price_from
        .map(|p| format!(" from £{p:.0}"))
        .unwrap_or_default();
    println!(
        "  [{}] {} ({}, {}){price}",
        act.slug, act.name, act.act_type, act.location
    );
}

fn print_venue(venue: &Venue) {
    let capacity = venue
        .capacity
        .map(|c| format!(", capacity {c}"))
        .unwrap_or_default();
    println!(
        "  [{}] {} ({}{capacity})",
        venue.slug, venue.name, venue.location
    );
}
